use clap::{ArgAction, Args, Parser, Subcommand};

use crate::form::FormField;
use crate::model::SearchFilters;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hospdir",
    version,
    about = "terminal client for the Moroccan hospitals directory",
    long_about = "hospdir browses and edits the Moroccan hospitals directory served by the hospitals web service.\n\nExamples:\n  hospdir list\n  hospdir search --region Casablanca-Settat --page 2\n  hospdir edit HOSP_0014 --commune Meknès\n  hospdir export --dir ~/Downloads\n  hospdir shell\n\nTip: Use --config to persist the server URL and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        global = true,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv, -vvv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "nc",
        visible_alias = "no-color",
        global = true,
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 's',
        long = "srv",
        visible_alias = "server",
        value_name = "URL",
        global = true,
        help_heading = "Connection",
        help = "Base URL of the directory service (defaults to http://localhost:5000)."
    )]
    pub server: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        global = true,
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.hospdir/config.yml)."
    )]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show one page of the full directory.
    List(PageArgs),
    /// Filter the directory; matching happens on the server.
    Search(SearchArgs),
    /// Show one hospital, read-only.
    Show { id: String },
    /// Add a hospital.
    Create(RecordArgs),
    /// Change an existing hospital; unspecified fields keep their value.
    Edit {
        #[arg(value_name = "ID")]
        target: String,
        #[command(flatten)]
        fields: RecordArgs,
    },
    /// Remove a hospital.
    Delete {
        id: String,
        #[arg(short = 'y', long = "yes", help = "Skip the confirmation prompt.")]
        yes: bool,
    },
    /// Replace the directory with the contents of a JSON file.
    Import { file: String },
    /// Save the full directory as moroccan_hospitals_<date>.json.
    Export {
        #[arg(short = 'd', long = "dir", value_name = "DIR")]
        dir: Option<String>,
    },
    /// Reset the directory to the built-in sample hospitals.
    Sample,
    /// Show counters and charts.
    Stats,
    /// Interactive session.
    Shell,
    /// Write the default config file if it does not exist.
    InitConfig,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PageArgs {
    #[arg(short = 'p', long = "page", value_name = "N", help = "Page to show (1-based).")]
    pub page: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    #[arg(long, value_name = "TEXT")]
    pub region: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub delegation: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub commune: Option<String>,
    #[arg(long, visible_alias = "categorie", value_name = "TEXT")]
    pub category: Option<String>,
    #[arg(long, visible_alias = "nom", value_name = "TEXT")]
    pub name: Option<String>,
    #[command(flatten)]
    pub page: PageArgs,
}

impl SearchArgs {
    pub fn to_filters(&self) -> SearchFilters {
        let text = |v: &Option<String>| v.as_deref().unwrap_or_default().trim().to_string();
        SearchFilters {
            region: text(&self.region),
            delegation: text(&self.delegation),
            commune: text(&self.commune),
            category: text(&self.category),
            name: text(&self.name),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RecordArgs {
    #[arg(long, value_name = "ID", help = "Identifier (assigned by the server when omitted).")]
    pub id: Option<String>,
    #[arg(long, visible_alias = "nom", value_name = "TEXT")]
    pub name: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub region: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub delegation: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub commune: Option<String>,
    #[arg(long, visible_alias = "categorie", value_name = "TEXT")]
    pub category: Option<String>,
}

impl RecordArgs {
    /// The fields given on the command line, in form order.
    pub fn assignments(&self) -> Vec<(FormField, String)> {
        [
            (FormField::Identifier, &self.id),
            (FormField::Name, &self.name),
            (FormField::Region, &self.region),
            (FormField::Delegation, &self.delegation),
            (FormField::Commune, &self.commune),
            (FormField::Category, &self.category),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.clone().map(|v| (field, v)))
        .collect()
    }
}
