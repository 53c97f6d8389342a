use crate::model::HospitalRecord;

pub const PAGE_SIZE: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageState {
    current: usize,
    size: usize,
}

impl PageState {
    pub fn new(size: usize) -> Self {
        PageState {
            current: 1,
            size: size.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn total_pages(&self, count: usize) -> usize {
        count.div_ceil(self.size).max(1)
    }
}

impl Default for PageState {
    fn default() -> Self {
        PageState::new(PAGE_SIZE)
    }
}

/// Pagination metadata derived from the store, recomputed on every read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageInfo {
    pub current: usize,
    pub total_pages: usize,
    /// 1-based index of the first visible item, 0 when nothing is loaded.
    pub start: usize,
    pub end: usize,
    pub total: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PageInfo {
    pub fn label(&self) -> String {
        format!("{}-{} sur {}", self.start, self.end, self.total)
    }
}

/// The loaded result set and the page currently shown.
///
/// The result set is only ever replaced wholesale; every replacement goes
/// back to page 1.
#[derive(Clone, Debug, Default)]
pub struct HospitalStore {
    records: Vec<HospitalRecord>,
    page: PageState,
}

impl HospitalStore {
    pub fn new() -> Self {
        HospitalStore::default()
    }

    pub fn with_page_size(size: usize) -> Self {
        HospitalStore {
            records: Vec::new(),
            page: PageState::new(size),
        }
    }

    pub fn replace(&mut self, records: Vec<HospitalRecord>) {
        tracing::debug!(count = records.len(), "result set replaced");
        self.records = records;
        self.page.current = 1;
    }

    pub fn records(&self) -> &[HospitalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page.size()
    }

    pub fn current_page(&self) -> usize {
        self.page.current()
    }

    pub fn total_pages(&self) -> usize {
        self.page.total_pages(self.records.len())
    }

    /// Moves to page `n` when it exists. Anything outside
    /// `[1, total_pages]` is ignored and reported as `false`.
    pub fn go_to_page(&mut self, n: usize) -> bool {
        if n < 1 || n > self.total_pages() || n == self.page.current {
            return false;
        }
        self.page.current = n;
        true
    }

    pub fn next_page(&mut self) -> bool {
        self.go_to_page(self.page.current + 1)
    }

    pub fn previous_page(&mut self) -> bool {
        match self.page.current.checked_sub(1) {
            Some(n) => self.go_to_page(n),
            None => false,
        }
    }

    pub fn visible(&self) -> &[HospitalRecord] {
        let start = (self.page.current - 1) * self.page.size;
        let end = (start + self.page.size).min(self.records.len());
        self.records.get(start..end).unwrap_or(&[])
    }

    pub fn page_info(&self) -> PageInfo {
        let total = self.records.len();
        let current = self.page.current;
        let total_pages = self.total_pages();
        let (start, end) = if total == 0 {
            (0, 0)
        } else {
            (
                (current - 1) * self.page.size + 1,
                (current * self.page.size).min(total),
            )
        };
        PageInfo {
            current,
            total_pages,
            start,
            end,
            total,
            has_previous: current > 1,
            has_next: current < total_pages,
        }
    }
}
