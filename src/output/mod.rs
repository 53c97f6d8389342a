pub mod charts;

use std::io::IsTerminal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tabled::builder::Builder;
use tabled::settings::object::{Cell, Columns, Object, Rows};
use tabled::settings::{Alignment, Color, Modify, Span, Style, Width};

use crate::form::{FieldMode, FormField, HospitalForm};
use crate::model::HospitalRecord;
use crate::store::PageInfo;

pub const NO_RESULTS: &str = "Aucun hôpital trouvé";

const MAX_CELL_WIDTH: usize = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertLevel {
    Success,
    Info,
    /// A user-facing rejection, shown as-is.
    Danger,
    /// A failed backend call, shown with an `Error:` prefix.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    pub fn success(message: impl Into<String>) -> Self {
        Alert {
            level: AlertLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Alert {
            level: AlertLevel::Info,
            message: message.into(),
        }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Alert {
            level: AlertLevel::Danger,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Alert {
            level: AlertLevel::Error,
            message: message.into(),
        }
    }

    pub fn render(&self, color: bool) -> String {
        let text = match self.level {
            AlertLevel::Error => format!("Error: {}", self.message),
            _ => self.message.clone(),
        };
        if !color {
            return format!("[{}] {}", self.tag(), text);
        }
        let tag = format!("[{}]", self.tag());
        let tag = match self.level {
            AlertLevel::Success => tag.green().bold(),
            AlertLevel::Info => tag.cyan().bold(),
            AlertLevel::Danger | AlertLevel::Error => tag.red().bold(),
        };
        format!("{tag} {text}")
    }

    fn tag(&self) -> &'static str {
        match self.level {
            AlertLevel::Success => "SUCCESS",
            AlertLevel::Info => "INFO",
            AlertLevel::Danger | AlertLevel::Error => "DANGER",
        }
    }
}

/// Where transient user-visible messages go.
pub trait AlertSink {
    fn push(&mut self, alert: Alert);
}

impl AlertSink for Vec<Alert> {
    fn push(&mut self, alert: Alert) {
        Vec::push(self, alert);
    }
}

/// Prints alerts to stderr as they arrive.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleAlerts {
    pub color: bool,
}

impl AlertSink for ConsoleAlerts {
    fn push(&mut self, alert: Alert) {
        eprintln!("{}", alert.render(self.color));
    }
}

/// Spinner shown while a backend call is in flight.
#[derive(Clone, Debug, Default)]
pub struct LoadingIndicator {
    draw: bool,
    active: Arc<AtomicUsize>,
}

impl LoadingIndicator {
    /// Draws on stderr when it is a terminal.
    pub fn stderr() -> Self {
        LoadingIndicator {
            draw: std::io::stderr().is_terminal(),
            active: Arc::default(),
        }
    }

    pub fn hidden() -> Self {
        LoadingIndicator::default()
    }

    pub fn start(&self, message: &str) -> Loading {
        let bar = ProgressBar::new_spinner();
        if self.draw {
            bar.set_draw_target(ProgressDrawTarget::stderr());
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(100));
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_message(message.to_string());
        self.active.fetch_add(1, Ordering::SeqCst);
        Loading {
            bar,
            active: Arc::clone(&self.active),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }
}

/// Clears its spinner when dropped, whatever the call's outcome.
pub struct Loading {
    bar: ProgressBar,
    active: Arc<AtomicUsize>,
}

impl Drop for Loading {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    View,
    Edit,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowAction {
    pub kind: ActionKind,
    pub id: String,
}

impl RowAction {
    /// The shell command that triggers this action.
    pub fn command(&self) -> String {
        let verb = match self.kind {
            ActionKind::View => "show",
            ActionKind::Edit => "edit",
            ActionKind::Delete => "delete",
        };
        format!("{verb} {}", self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableRow {
    Record {
        cells: [String; 6],
        actions: [RowAction; 3],
    },
    Placeholder {
        message: String,
    },
}

pub const COLUMNS: [&str; 6] = [
    "ID",
    "Nom de l'établissement",
    "Région",
    "Délégation",
    "Commune",
    "Catégorie",
];

/// One row per record, in the order given; an empty slice yields the single
/// "no results" row.
pub fn build_rows(records: &[HospitalRecord]) -> Vec<TableRow> {
    if records.is_empty() {
        return vec![TableRow::Placeholder {
            message: NO_RESULTS.to_string(),
        }];
    }
    records
        .iter()
        .map(|r| {
            let id = r.display_id().to_string();
            let action = |kind| RowAction {
                kind,
                id: id.clone(),
            };
            TableRow::Record {
                actions: [
                    action(ActionKind::View),
                    action(ActionKind::Edit),
                    action(ActionKind::Delete),
                ],
                cells: [
                    id.clone(),
                    r.display_name().to_string(),
                    r.display_region().to_string(),
                    r.display_delegation().to_string(),
                    r.display_commune().to_string(),
                    r.display_category().to_string(),
                ],
            }
        })
        .collect()
}

pub fn render_pagination(info: &PageInfo, color: bool) -> String {
    let prev = if info.has_previous { "‹ prev" } else { "  ----" };
    let next = if info.has_next { "next ›" } else { "----  " };
    let label = info.label();
    let page = format!("page {}/{}", info.current, info.total_pages);
    if color {
        format!("{}  {}  {}  ({})", prev.cyan(), label.bold(), next.cyan(), page.dimmed())
    } else {
        format!("{prev}  {label}  {next}  ({page})")
    }
}

/// Lays rows out as a rounded table followed by the pagination footer.
/// Cells wider than the column cap are truncated on display width.
pub fn render_table(rows: &[TableRow], info: &PageInfo, color: bool) -> String {
    let mut builder = Builder::default();
    builder.push_record(COLUMNS);
    let mut placeholder = false;
    for row in rows {
        match row {
            TableRow::Record { cells, .. } => builder.push_record(cells.clone()),
            TableRow::Placeholder { message } => {
                placeholder = true;
                let mut cells = vec![String::new(); COLUMNS.len()];
                cells[0] = message.clone();
                builder.push_record(cells);
            }
        }
    }

    let mut table = builder.build();
    table.with(Style::rounded()).with(
        Modify::new(Columns::new(..))
            .with(Width::truncate(MAX_CELL_WIDTH).suffix("…")),
    );
    if placeholder {
        table.with(
            Modify::new(Cell::new(1, 0))
                .with(Span::column(COLUMNS.len() as _))
                .with(Alignment::center()),
        );
    }
    if color {
        table
            .with(Modify::new(Rows::first()).with(Color::BOLD))
            .with(Modify::new(Columns::single(0).not(Rows::first())).with(Color::BOLD))
            .with(Modify::new(Columns::single(2).not(Rows::first())).with(Color::FG_BLUE))
            .with(Modify::new(Columns::single(5).not(Rows::first())).with(Color::FG_MAGENTA));
    }

    let mut out = table.to_string();
    out.push('\n');
    out.push_str(&render_pagination(info, color));
    out.push('\n');
    out
}

/// Renders the open record form: title, one line per field, inline markers
/// for fields that failed validation.
pub fn render_form(form: &HospitalForm, color: bool) -> String {
    let mut out = String::new();
    let title = form.title();
    if color {
        out.push_str(&title.bold().to_string());
    } else {
        out.push_str(title);
    }
    if form.mode() == FieldMode::ReadOnly {
        out.push_str(" (lecture seule)");
    }
    out.push('\n');

    let width = FormField::ALL
        .iter()
        .map(|f| f.label().chars().count())
        .max()
        .unwrap_or(0);
    for field in FormField::ALL {
        let value = form.fields().get(field);
        let shown = if value.is_empty() { "-" } else { value };
        out.push_str(&format!("  {:<width$} : {}", field.label(), shown));
        if let Some(err) = form.error_for(field) {
            let marker = format!("  ✗ {err}");
            if color {
                out.push_str(&marker.red().to_string());
            } else {
                out.push_str(&marker);
            }
        }
        out.push('\n');
    }
    out
}
