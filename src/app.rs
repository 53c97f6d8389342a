use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{error::ErrorKind, Parser};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::api::{self, ApiClient, Backend, RequestError, DEFAULT_SERVER};
use crate::cli::args::{CliArgs, Command};
use crate::cli::shell::{self, ShellCommand};
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::form::{FormController, FormError, FormField, Submission};
use crate::model::SearchFilters;
use crate::output::charts::StatisticsRenderer;
use crate::output::{self, Alert, AlertSink, ConsoleAlerts, LoadingIndicator};
use crate::store::HospitalStore;
use crate::transfer::{self, TransferError};

const LOADING: &str = "Chargement...";
const CREATED: &str = "Hôpital ajouté avec succès!";
const UPDATED: &str = "Hôpital modifié avec succès!";
const DELETED: &str = "Hôpital supprimé avec succès!";
const EXPORTED: &str = "Données exportées avec succès!";
const NOT_JSON: &str = "Veuillez sélectionner un fichier JSON valide.";
const UPLOAD_FAILED: &str = "Erreur lors du chargement du fichier.";

/// Why a handler gave up. Every variant has already been shown to the user
/// by the time the handler returns it.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{source}")]
    Request {
        #[from]
        source: RequestError,
    },

    #[error("{source}")]
    Form {
        #[from]
        source: FormError,
    },

    #[error("{source}")]
    Transfer {
        #[from]
        source: TransferError,
    },
}

/// Everything one client session owns: the backend, the loaded result set,
/// the open modal, the chart slots and where alerts go.
pub struct App<B, S> {
    backend: B,
    alerts: S,
    store: HospitalStore,
    filters: SearchFilters,
    forms: FormController,
    statistics: StatisticsRenderer,
    loading: LoadingIndicator,
}

impl<B: Backend, S: AlertSink> App<B, S> {
    pub fn new(backend: B, alerts: S) -> Self {
        App {
            backend,
            alerts,
            store: HospitalStore::new(),
            filters: SearchFilters::default(),
            forms: FormController::new(),
            statistics: StatisticsRenderer::new(),
            loading: LoadingIndicator::hidden(),
        }
    }

    pub fn with_loading(mut self, loading: LoadingIndicator) -> Self {
        self.loading = loading;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn alerts(&self) -> &S {
        &self.alerts
    }

    pub fn store(&self) -> &HospitalStore {
        &self.store
    }

    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    pub fn forms(&self) -> &FormController {
        &self.forms
    }

    pub fn statistics(&self) -> &StatisticsRenderer {
        &self.statistics
    }

    pub fn loading(&self) -> &LoadingIndicator {
        &self.loading
    }

    pub fn notify(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    /// Logs a failed backend call and shows it once.
    fn surface<T>(&mut self, result: Result<T, RequestError>) -> Result<T, AppError> {
        result.map_err(|err| {
            tracing::error!(status = ?err.status(), "request failed: {err}");
            self.alerts.push(Alert::error(err.to_string()));
            AppError::from(err)
        })
    }

    fn reject(&mut self, err: impl Into<AppError>, message: impl Into<String>) -> AppError {
        let err = err.into();
        tracing::warn!("{err}");
        self.alerts.push(Alert::danger(message));
        err
    }

    pub async fn load(&mut self) -> Result<(), AppError> {
        let result = {
            let _spinner = self.loading.start(LOADING);
            self.backend.list().await
        };
        let records = self.surface(result)?;
        self.store.replace(records);
        Ok(())
    }

    pub async fn search(&mut self, filters: SearchFilters) -> Result<(), AppError> {
        self.filters = filters;
        let result = {
            let _spinner = self.loading.start(LOADING);
            self.backend.search(&self.filters).await
        };
        let records = self.surface(result)?;
        self.store.replace(records);
        Ok(())
    }

    pub async fn clear(&mut self) -> Result<(), AppError> {
        self.filters.clear();
        self.load().await
    }

    pub fn next_page(&mut self) -> bool {
        self.store.next_page()
    }

    pub fn previous_page(&mut self) -> bool {
        self.store.previous_page()
    }

    pub fn go_to_page(&mut self, n: usize) -> bool {
        self.store.go_to_page(n)
    }

    pub async fn load_statistics(&mut self) -> Result<(), AppError> {
        let result = {
            let _spinner = self.loading.start(LOADING);
            self.backend.statistics().await
        };
        let stats = self.surface(result)?;
        self.statistics.render(&stats);
        Ok(())
    }

    /// Reloads the unfiltered list and the statistics after a mutation. A
    /// failure here is already surfaced and does not undo the mutation.
    async fn refresh(&mut self) {
        if self.load().await.is_err() {
            tracing::warn!("list reload failed after mutation");
        }
        if self.load_statistics().await.is_err() {
            tracing::warn!("statistics reload failed after mutation");
        }
    }

    pub fn show_create(&mut self) {
        self.forms.open_create();
    }

    pub async fn view(&mut self, id: &str) -> Result<(), AppError> {
        let result = {
            let _spinner = self.loading.start(LOADING);
            self.backend.fetch(id).await
        };
        let record = self.surface(result)?;
        self.forms.open_view(id, &record);
        Ok(())
    }

    pub async fn edit(&mut self, id: &str) -> Result<(), AppError> {
        let result = {
            let _spinner = self.loading.start(LOADING);
            self.backend.fetch(id).await
        };
        let record = self.surface(result)?;
        self.forms.open_edit(id, &record);
        Ok(())
    }

    pub fn set_field(&mut self, field: FormField, value: &str) -> Result<(), AppError> {
        match self.forms.set_field(field, value) {
            Ok(()) => Ok(()),
            Err(err) => {
                let message = err.to_string();
                Err(self.reject(err, message))
            }
        }
    }

    pub fn set_fields(&mut self, assignments: &[(FormField, String)]) -> Result<(), AppError> {
        for (field, value) in assignments {
            self.set_field(*field, value)?;
        }
        Ok(())
    }

    /// Validates and sends the open form. The modal only closes once the
    /// backend has accepted the change.
    pub async fn save(&mut self) -> Result<(), AppError> {
        let submission = match self.forms.submit() {
            Ok(submission) => submission,
            Err(err) => {
                let message = err.to_string();
                return Err(self.reject(err, message));
            }
        };

        let (result, message) = {
            let _spinner = self.loading.start(LOADING);
            match &submission {
                Submission::Create(record) => (self.backend.create(record).await, CREATED),
                Submission::Update { id, record } => {
                    (self.backend.update(id, record).await, UPDATED)
                }
            }
        };
        self.surface(result)?;

        self.alerts.push(Alert::success(message));
        self.forms.close();
        self.refresh().await;
        Ok(())
    }

    /// Opens the confirmation step; nothing is sent yet.
    pub fn delete(&mut self, id: &str) {
        self.forms.open_delete(id);
    }

    pub fn cancel(&mut self) {
        self.forms.close();
    }

    pub async fn confirm_delete(&mut self) -> Result<(), AppError> {
        let id = match self.forms.pending_delete() {
            Some(id) => id.to_string(),
            None => {
                let err = FormError::NoPendingDelete;
                let message = err.to_string();
                return Err(self.reject(err, message));
            }
        };

        let result = {
            let _spinner = self.loading.start(LOADING);
            self.backend.delete(&id).await
        };
        self.surface(result)?;

        self.alerts.push(Alert::success(DELETED));
        self.forms.close();
        self.refresh().await;
        Ok(())
    }

    /// Replaces the backend data with a local JSON file.
    pub async fn import(&mut self, path: &Path) -> Result<(), AppError> {
        let (file_name, contents) = match transfer::read_import(path).await {
            Ok(file) => file,
            Err(err @ TransferError::NotJson { .. }) => return Err(self.reject(err, NOT_JSON)),
            Err(err) => {
                let message = err.to_string();
                return Err(self.reject(err, message));
            }
        };

        let result = {
            let _spinner = self.loading.start(LOADING);
            self.backend.upload(&file_name, contents).await
        };
        let body = match result {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(status = ?err.status(), "upload failed: {err}");
                let message = if err.is_transport() {
                    UPLOAD_FAILED.to_string()
                } else {
                    err.to_string()
                };
                self.alerts.push(Alert::danger(message));
                return Err(err.into());
            }
        };

        if let Some(message) = api::success_message(&body) {
            self.alerts.push(Alert::success(message));
        }
        self.refresh().await;
        Ok(())
    }

    /// Downloads the full directory and writes it under `dir`.
    pub async fn export(&mut self, dir: &Path, date: NaiveDate) -> Result<PathBuf, AppError> {
        let result = {
            let _spinner = self.loading.start(LOADING);
            self.backend.export().await
        };
        let body = self.surface(result)?;

        match transfer::write_export(dir, date, &body).await {
            Ok(path) => {
                self.alerts.push(Alert::success(EXPORTED));
                Ok(path)
            }
            Err(err) => {
                let message = err.to_string();
                Err(self.reject(err, message))
            }
        }
    }

    pub async fn create_sample(&mut self) -> Result<(), AppError> {
        let result = {
            let _spinner = self.loading.start(LOADING);
            self.backend.create_sample().await
        };
        let body = self.surface(result)?;
        if let Some(message) = api::success_message(&body) {
            self.alerts.push(Alert::success(message));
        }
        self.refresh().await;
        Ok(())
    }

    pub fn table_text(&self, color: bool) -> String {
        output::render_table(
            &output::build_rows(self.store.visible()),
            &self.store.page_info(),
            color,
        )
    }

    pub fn form_text(&self, color: bool) -> Option<String> {
        self.forms.form().map(|form| output::render_form(form, color))
    }

    pub fn statistics_text(&self, color: bool) -> String {
        self.statistics.to_text(color)
    }
}

#[derive(Clone, Debug)]
struct RunConfig {
    server: String,
    no_color: bool,
    verbose: u8,
    export_dir: PathBuf,
    command: Command,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let server = args
        .server
        .or(cfg.server)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    validation::check_server(&server)?;

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let verbose = if args.verbose > 0 {
        args.verbose
    } else {
        cfg.verbose.unwrap_or(0).min(3)
    };

    let export_dir = match &args.command {
        Command::Export { dir: Some(dir) } => config::expand_tilde(dir),
        _ => cfg
            .export_dir
            .as_deref()
            .map(config::expand_tilde)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    Ok(RunConfig {
        server,
        no_color,
        verbose,
        export_dir,
        command: args.command,
    })
}

fn init_tracing(verbose: u8, color: bool) {
    let level = match verbose {
        0 => "off",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hospdir={level}")));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(color),
        )
        .try_init();
}

fn exit_code<T>(result: Result<T, AppError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

// Export files are stamped with the UTC calendar date, whatever the local zone.
fn utc_date<Tz: chrono::TimeZone>(now: chrono::DateTime<Tz>) -> NaiveDate {
    now.with_timezone(&chrono::Utc).date_naive()
}

fn today() -> NaiveDate {
    utc_date(chrono::Local::now())
}

fn line_editor() -> Result<DefaultEditor, String> {
    DefaultEditor::new().map_err(|e| format!("failed to open terminal: {e}"))
}

/// One line from the terminal; `None` once the user hits Ctrl-D or Ctrl-C.
fn read_line(editor: &mut DefaultEditor, prompt: &str) -> Result<Option<String>, String> {
    match editor.readline(prompt) {
        Ok(line) => Ok(Some(line)),
        Err(ReadlineError::Eof | ReadlineError::Interrupted) => Ok(None),
        Err(e) => Err(format!("failed to read stdin: {e}")),
    }
}

async fn run_async(run: RunConfig) -> Result<ExitCode, String> {
    let color = !run.no_color;
    if run.no_color {
        colored::control::set_override(false);
    }

    let client = ApiClient::new(&run.server).map_err(|e| e.to_string())?;
    tracing::info!(server = %client.base_url(), "using directory service");
    let mut app = App::new(client, ConsoleAlerts { color })
        .with_loading(LoadingIndicator::stderr());

    let code = match run.command {
        Command::List(page) => {
            let result = app.load().await;
            if result.is_ok() {
                if let Some(n) = page.page {
                    app.go_to_page(n);
                }
                print!("{}", app.table_text(color));
            }
            exit_code(result)
        }
        Command::Search(search) => {
            let result = app.search(search.to_filters()).await;
            if result.is_ok() {
                if let Some(n) = search.page.page {
                    app.go_to_page(n);
                }
                print!("{}", app.table_text(color));
            }
            exit_code(result)
        }
        Command::Show { id } => {
            let result = app.view(&id).await;
            if let Some(text) = app.form_text(color) {
                print!("{text}");
            }
            exit_code(result)
        }
        Command::Create(fields) => {
            app.show_create();
            let result = match app.set_fields(&fields.assignments()) {
                Ok(()) => app.save().await,
                Err(err) => Err(err),
            };
            if let Some(text) = app.form_text(color) {
                print!("{text}");
            }
            exit_code(result)
        }
        Command::Edit { target, fields } => {
            let result = match app.edit(&target).await {
                Ok(()) => match app.set_fields(&fields.assignments()) {
                    Ok(()) => app.save().await,
                    Err(err) => Err(err),
                },
                Err(err) => Err(err),
            };
            if let Some(text) = app.form_text(color) {
                print!("{text}");
            }
            exit_code(result)
        }
        Command::Delete { id, yes } => {
            app.delete(&id);
            let confirmed = if yes {
                true
            } else {
                let mut editor = line_editor()?;
                read_line(&mut editor, &format!("Supprimer l'hôpital {id} ? [y/N] "))?
                    .is_some_and(|answer| shell::is_affirmative(&answer))
            };
            if confirmed {
                exit_code(app.confirm_delete().await)
            } else {
                app.cancel();
                app.notify(Alert::info("Suppression annulée."));
                ExitCode::SUCCESS
            }
        }
        Command::Import { file } => exit_code(app.import(&config::expand_tilde(&file)).await),
        Command::Export { .. } => {
            let result = app.export(&run.export_dir, today()).await;
            if let Ok(path) = &result {
                println!("{}", path.display());
            }
            exit_code(result)
        }
        Command::Sample => exit_code(app.create_sample().await),
        Command::Stats => {
            let result = app.load_statistics().await;
            if result.is_ok() {
                print!("{}", app.statistics_text(color));
            }
            exit_code(result)
        }
        Command::Shell => run_shell(&mut app, &run.export_dir, color).await?,
        Command::InitConfig => ExitCode::SUCCESS,
    };
    Ok(code)
}

/// Prints the open form when there is one, the current page otherwise.
fn show_state<B: Backend, S: AlertSink>(app: &App<B, S>, color: bool) {
    match app.form_text(color) {
        Some(text) => print!("{text}"),
        None => print!("{}", app.table_text(color)),
    }
}

async fn run_shell<B: Backend, S: AlertSink>(
    app: &mut App<B, S>,
    export_dir: &Path,
    color: bool,
) -> Result<ExitCode, String> {
    if app.load().await.is_ok() {
        print!("{}", app.table_text(color));
    }
    let _ = app.load_statistics().await;
    println!("type 'help' for commands");

    let mut editor = line_editor()?;
    loop {
        let Some(line) = read_line(&mut editor, "hospdir> ")? else {
            break;
        };
        if !line.trim().is_empty() {
            let _ = editor.add_history_entry(line.as_str());
        }

        let command = match shell::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                app.notify(Alert::danger(e));
                continue;
            }
        };

        match command {
            ShellCommand::Empty => {}
            ShellCommand::Quit => break,
            ShellCommand::Help => println!("{}", shell::HELP),
            ShellCommand::List => {
                if app.load().await.is_ok() {
                    print!("{}", app.table_text(color));
                }
            }
            ShellCommand::Search(filters) => {
                if app.search(filters).await.is_ok() {
                    print!("{}", app.table_text(color));
                }
            }
            ShellCommand::Clear => {
                if app.clear().await.is_ok() {
                    print!("{}", app.table_text(color));
                }
            }
            ShellCommand::Next => {
                app.next_page();
                print!("{}", app.table_text(color));
            }
            ShellCommand::Previous => {
                app.previous_page();
                print!("{}", app.table_text(color));
            }
            ShellCommand::Page(n) => {
                app.go_to_page(n);
                print!("{}", app.table_text(color));
            }
            ShellCommand::Show(id) => {
                if app.view(&id).await.is_ok() {
                    show_state(app, color);
                }
            }
            ShellCommand::Create(assignments) => {
                app.show_create();
                if app.set_fields(&assignments).is_ok() && !assignments.is_empty() {
                    let _ = app.save().await;
                }
                show_state(app, color);
            }
            ShellCommand::Edit { id, assignments } => {
                if app.edit(&id).await.is_ok() {
                    if app.set_fields(&assignments).is_ok() && !assignments.is_empty() {
                        let _ = app.save().await;
                    }
                    show_state(app, color);
                }
            }
            ShellCommand::Set(assignments) => {
                let _ = app.set_fields(&assignments);
                show_state(app, color);
            }
            ShellCommand::Save => {
                let _ = app.save().await;
                show_state(app, color);
            }
            ShellCommand::Delete(id) => {
                app.delete(&id);
                println!("Supprimer l'hôpital {id} ? (yes/no)");
            }
            ShellCommand::Confirm => {
                if app.confirm_delete().await.is_ok() {
                    print!("{}", app.table_text(color));
                }
            }
            ShellCommand::Cancel => {
                app.cancel();
                print!("{}", app.table_text(color));
            }
            ShellCommand::Import(path) => {
                if app.import(&config::expand_tilde(&path.to_string_lossy())).await.is_ok() {
                    print!("{}", app.table_text(color));
                }
            }
            ShellCommand::Export(dir) => {
                let dir = dir.unwrap_or_else(|| export_dir.to_path_buf());
                if let Ok(path) = app.export(&dir, today()).await {
                    println!("{}", path.display());
                }
            }
            ShellCommand::Sample => {
                if app.create_sample().await.is_ok() {
                    print!("{}", app.table_text(color));
                }
            }
            ShellCommand::Stats => {
                if app.load_statistics().await.is_ok() {
                    print!("{}", app.statistics_text(color));
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn run_cli() -> Result<ExitCode, String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                let _ = e.print();
                return Ok(ExitCode::SUCCESS);
            }
            _ => return Err(e.to_string()),
        },
    };

    let explicit_config = args.config.as_deref().map(config::expand_tilde);
    let config_path = explicit_config.clone().or_else(config::default_config_path);

    if matches!(args.command, Command::InitConfig) {
        let path = config_path.ok_or("cannot locate a home directory for the config file")?;
        if config::ensure_default_config_file(&path)? {
            println!("wrote {}", path.display());
        } else {
            println!("{} already exists", path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = match config_path.as_ref() {
        Some(path) => config::load_config(path, explicit_config.is_none())?,
        None => ConfigFile::default(),
    };

    let run = build_run_config(args, cfg)?;
    init_tracing(run.verbose, !run.no_color);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))
}
