use crate::cli::args::{CliArgs, Command};

fn check_page(page: Option<usize>) -> Result<(), String> {
    match page {
        Some(0) => Err("invalid page, expected a positive integer".to_string()),
        _ => Ok(()),
    }
}

pub fn check_server(raw: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(raw.trim()).map_err(|e| format!("invalid --server '{raw}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("invalid --server '{raw}': expected an http(s) URL"));
    }
    Ok(())
}

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(raw) = args.server.as_deref() {
        check_server(raw)?;
    }
    if args.verbose > 3 {
        return Err("invalid verbosity, use at most -vvv".to_string());
    }
    match &args.command {
        Command::List(page) => check_page(page.page)?,
        Command::Search(search) => check_page(search.page.page)?,
        Command::Show { id } | Command::Delete { id, .. } if id.trim().is_empty() => {
            return Err("invalid ID, expected a non-empty identifier".to_string());
        }
        Command::Edit { target, .. } if target.trim().is_empty() => {
            return Err("invalid ID, expected a non-empty identifier".to_string());
        }
        Command::Import { file } if file.trim().is_empty() => {
            return Err("invalid FILE, expected a path".to_string());
        }
        _ => {}
    }
    Ok(())
}
