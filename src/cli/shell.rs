use std::path::PathBuf;

use crate::form::FormField;
use crate::model::SearchFilters;

pub const HELP: &str = "\
commands:
  list                      reload the full directory
  search key=value ...      filter (region, delegation, commune, category, name)
  clear                     drop filters and reload
  next | prev | page N      move between pages
  show ID                   open a hospital read-only
  create key=value ...      open the create form (and save when complete)
  edit ID key=value ...     open the edit form (and save when complete)
  set key=value ...         change fields of the open form
  save                      submit the open form
  delete ID                 ask to delete a hospital
  yes | no                  answer a pending delete, `no` also closes a form
  import FILE               replace the directory with a JSON file
  export [DIR]              write moroccan_hospitals_<date>.json
  sample                    load the sample hospitals
  stats                     show counters and charts
  help | quit
Quote values containing spaces: name=\"Hôpital Ibn Sina\"";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    List,
    Search(SearchFilters),
    Clear,
    Next,
    Previous,
    Page(usize),
    Show(String),
    Create(Vec<(FormField, String)>),
    Edit {
        id: String,
        assignments: Vec<(FormField, String)>,
    },
    Set(Vec<(FormField, String)>),
    Save,
    Delete(String),
    Confirm,
    Cancel,
    Import(PathBuf),
    Export(Option<PathBuf>),
    Sample,
    Stats,
    Help,
    Quit,
}

/// Splits on whitespace; double quotes group, anywhere in a word.
pub fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    tokens.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quoted {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        tokens.push(current);
    }
    Ok(tokens)
}

fn split_pair(token: &str) -> Result<(&str, &str), String> {
    token
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{token}'"))
}

fn assignments(tokens: &[String]) -> Result<Vec<(FormField, String)>, String> {
    tokens
        .iter()
        .map(|t| {
            let (key, value) = split_pair(t)?;
            let field = FormField::parse(key).ok_or_else(|| format!("unknown field '{key}'"))?;
            Ok((field, value.to_string()))
        })
        .collect()
}

fn one_arg<'a>(verb: &str, rest: &'a [String]) -> Result<&'a str, String> {
    match rest {
        [arg] => Ok(arg.as_str()),
        _ => Err(format!("usage: {verb} <ARG>")),
    }
}

pub fn parse(line: &str) -> Result<ShellCommand, String> {
    let tokens = tokenize(line)?;
    let Some((verb, rest)) = tokens.split_first() else {
        return Ok(ShellCommand::Empty);
    };

    let no_args = |cmd: ShellCommand| {
        if rest.is_empty() {
            Ok(cmd)
        } else {
            Err(format!("'{verb}' takes no arguments"))
        }
    };

    match verb.to_lowercase().as_str() {
        "list" | "ls" => no_args(ShellCommand::List),
        "search" | "find" => {
            let mut filters = SearchFilters::default();
            for token in rest {
                let (key, value) = split_pair(token)?;
                filters.set(key, value)?;
            }
            Ok(ShellCommand::Search(filters))
        }
        "clear" => no_args(ShellCommand::Clear),
        "next" | "n" => no_args(ShellCommand::Next),
        "prev" | "p" => no_args(ShellCommand::Previous),
        "page" => {
            let raw = one_arg("page", rest)?;
            raw.parse::<usize>()
                .map(ShellCommand::Page)
                .map_err(|_| format!("invalid page '{raw}'"))
        }
        "show" | "view" => Ok(ShellCommand::Show(one_arg("show", rest)?.to_string())),
        "create" | "add" => Ok(ShellCommand::Create(assignments(rest)?)),
        "edit" => match rest.split_first() {
            Some((id, fields)) => Ok(ShellCommand::Edit {
                id: id.clone(),
                assignments: assignments(fields)?,
            }),
            None => Err("usage: edit <ID> [key=value ...]".to_string()),
        },
        "set" => Ok(ShellCommand::Set(assignments(rest)?)),
        "save" => no_args(ShellCommand::Save),
        "delete" | "rm" => Ok(ShellCommand::Delete(one_arg("delete", rest)?.to_string())),
        "yes" | "y" => no_args(ShellCommand::Confirm),
        "no" | "cancel" => no_args(ShellCommand::Cancel),
        "import" => Ok(ShellCommand::Import(PathBuf::from(one_arg("import", rest)?))),
        "export" => match rest {
            [] => Ok(ShellCommand::Export(None)),
            [dir] => Ok(ShellCommand::Export(Some(PathBuf::from(dir)))),
            _ => Err("usage: export [DIR]".to_string()),
        },
        "sample" => no_args(ShellCommand::Sample),
        "stats" => no_args(ShellCommand::Stats),
        "help" | "?" => no_args(ShellCommand::Help),
        "quit" | "exit" | "q" => no_args(ShellCommand::Quit),
        other => Err(format!("unknown command '{other}', try 'help'")),
    }
}

/// Whether a confirmation answer means yes.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "o" | "oui"
    )
}
