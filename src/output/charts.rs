use colored::{Color, Colorize};

use crate::model::{CountMap, Statistics};

pub const REGION_PALETTE: [&str; 8] = [
    "#FF6384", "#36A2EB", "#FFCE56", "#4BC0C0", "#9966FF", "#FF9F40", "#C9CBCF", "#4BC0C0",
];
pub const CATEGORY_FILL: &str = "#36A2EB";
pub const CATEGORY_BORDER: &str = "#2196F3";
pub const CATEGORY_LABEL: &str = "Nombre d'hôpitaux";

const BAR_WIDTH: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartKind {
    /// Share of the whole per label.
    Doughnut,
    /// Magnitude per label.
    Bar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegendPosition {
    Bottom,
    Hidden,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dataset {
    pub label: Option<String>,
    pub data: Vec<u64>,
    pub background: Vec<String>,
    pub border: Option<String>,
    pub border_width: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartConfig {
    pub kind: ChartKind,
    pub labels: Vec<String>,
    pub dataset: Dataset,
    pub legend: LegendPosition,
    pub begin_at_zero: bool,
    pub step_size: Option<u64>,
}

pub fn region_chart(regions: &CountMap) -> ChartConfig {
    ChartConfig {
        kind: ChartKind::Doughnut,
        labels: regions.labels(),
        dataset: Dataset {
            label: None,
            data: regions.values(),
            background: REGION_PALETTE.iter().map(|c| c.to_string()).collect(),
            border: None,
            border_width: 0,
        },
        legend: LegendPosition::Bottom,
        begin_at_zero: false,
        step_size: None,
    }
}

pub fn category_chart(categories: &CountMap) -> ChartConfig {
    ChartConfig {
        kind: ChartKind::Bar,
        labels: categories.labels(),
        dataset: Dataset {
            label: Some(CATEGORY_LABEL.to_string()),
            data: categories.values(),
            background: vec![CATEGORY_FILL.to_string()],
            border: Some(CATEGORY_BORDER.to_string()),
            border_width: 1,
        },
        legend: LegendPosition::Hidden,
        begin_at_zero: true,
        step_size: Some(1),
    }
}

/// A drawn chart; `serial` counts draws within its slot.
#[derive(Debug)]
pub struct Chart {
    serial: u64,
    config: ChartConfig,
}

impl Chart {
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    fn destroy(self, slot: &str) {
        tracing::debug!(slot, serial = self.serial, "chart destroyed");
    }
}

/// Holds at most one live chart. Redrawing tears the previous one down first.
#[derive(Debug)]
pub struct ChartSlot {
    name: &'static str,
    current: Option<Chart>,
    drawn: u64,
    destroyed: u64,
}

impl ChartSlot {
    pub fn new(name: &'static str) -> Self {
        ChartSlot {
            name,
            current: None,
            drawn: 0,
            destroyed: 0,
        }
    }

    pub fn redraw(&mut self, config: ChartConfig) -> &Chart {
        if let Some(previous) = self.current.take() {
            previous.destroy(self.name);
            self.destroyed += 1;
        }
        self.drawn += 1;
        self.current.insert(Chart {
            serial: self.drawn,
            config,
        })
    }

    pub fn current(&self) -> Option<&Chart> {
        self.current.as_ref()
    }

    pub fn drawn(&self) -> u64 {
        self.drawn
    }

    pub fn destroyed(&self) -> u64 {
        self.destroyed
    }

    /// Charts currently on screen for this slot; never more than one.
    pub fn live(&self) -> u64 {
        self.drawn - self.destroyed
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatCounters {
    pub total_hospitals: u64,
    pub regions: usize,
    pub delegations: usize,
    pub categories: usize,
}

#[derive(Debug)]
pub struct StatisticsRenderer {
    counters: StatCounters,
    region_chart: ChartSlot,
    category_chart: ChartSlot,
}

impl Default for StatisticsRenderer {
    fn default() -> Self {
        StatisticsRenderer {
            counters: StatCounters::default(),
            region_chart: ChartSlot::new("regions"),
            category_chart: ChartSlot::new("categories"),
        }
    }
}

impl StatisticsRenderer {
    pub fn new() -> Self {
        StatisticsRenderer::default()
    }

    pub fn render(&mut self, stats: &Statistics) {
        self.counters = StatCounters {
            total_hospitals: stats.total_hospitals,
            regions: stats.regions.len(),
            delegations: stats.delegations.len(),
            categories: stats.categories.len(),
        };
        self.region_chart.redraw(region_chart(&stats.regions));
        self.category_chart.redraw(category_chart(&stats.categories));
    }

    pub fn counters(&self) -> StatCounters {
        self.counters
    }

    pub fn region_slot(&self) -> &ChartSlot {
        &self.region_chart
    }

    pub fn category_slot(&self) -> &ChartSlot {
        &self.category_chart
    }

    pub fn to_text(&self, color: bool) -> String {
        let c = self.counters;
        let mut out = String::new();
        let cards = [
            ("Hôpitaux", c.total_hospitals.to_string()),
            ("Régions", c.regions.to_string()),
            ("Délégations", c.delegations.to_string()),
            ("Catégories", c.categories.to_string()),
        ];
        let line: Vec<String> = cards
            .iter()
            .map(|(label, value)| {
                if color {
                    format!("{}: {}", label, value.bold())
                } else {
                    format!("{label}: {value}")
                }
            })
            .collect();
        out.push_str(&line.join("   "));
        out.push('\n');

        for (title, slot) in [
            ("Répartition par région", &self.region_chart),
            ("Hôpitaux par catégorie", &self.category_chart),
        ] {
            out.push('\n');
            if color {
                out.push_str(&title.bold().to_string());
            } else {
                out.push_str(title);
            }
            out.push('\n');
            if let Some(chart) = slot.current() {
                out.push_str(&render_chart(chart.config(), color));
            }
        }
        out
    }
}

pub fn parse_hex(hex: &str) -> Option<Color> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
    Some(Color::TrueColor {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

fn bar(len: usize, hex: &str, color: bool) -> String {
    let glyphs = "█".repeat(len);
    match (color, parse_hex(hex)) {
        (true, Some(c)) => glyphs.color(c).to_string(),
        _ => glyphs,
    }
}

/// Terminal rendering of one chart configuration.
pub fn render_chart(config: &ChartConfig, color: bool) -> String {
    let data = &config.dataset.data;
    if config.labels.is_empty() {
        return "  (aucune donnée)\n".to_string();
    }
    let label_width = config
        .labels
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    match config.kind {
        ChartKind::Doughnut => {
            let total: u64 = data.iter().sum();
            for (i, (label, value)) in config.labels.iter().zip(data).enumerate() {
                let hex = config
                    .dataset
                    .background
                    .get(i % config.dataset.background.len().max(1))
                    .map(String::as_str)
                    .unwrap_or(CATEGORY_FILL);
                let share = if total == 0 {
                    0.0
                } else {
                    *value as f64 * 100.0 / total as f64
                };
                let len = (share / 100.0 * BAR_WIDTH as f64).round() as usize;
                let pad = label_width.saturating_sub(label.chars().count());
                out.push_str(&format!(
                    "  {}{} {:>5.1}% {}\n",
                    label,
                    " ".repeat(pad),
                    share,
                    bar(len, hex, color)
                ));
            }
        }
        ChartKind::Bar => {
            let max = data.iter().copied().max().unwrap_or(0);
            let hex = config
                .dataset
                .background
                .first()
                .map(String::as_str)
                .unwrap_or(CATEGORY_FILL);
            for (label, value) in config.labels.iter().zip(data) {
                let len = if max == 0 {
                    0
                } else {
                    (*value as usize * BAR_WIDTH).div_ceil(max as usize)
                };
                let pad = label_width.saturating_sub(label.chars().count());
                out.push_str(&format!(
                    "  {}{} │{} {}\n",
                    label,
                    " ".repeat(pad),
                    bar(len, hex, color),
                    value
                ));
            }
        }
    }
    out
}
