use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const EXPORT_PREFIX: &str = "moroccan_hospitals_";
pub const IMPORT_SUFFIX: &str = ".json";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("not a JSON file: {file_name}")]
    NotJson { file_name: String },

    #[error("failed to read import file: {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write export file: {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize export: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}

/// Returns the file name to upload, or rejects anything not named `*.json`.
pub fn check_import_path(path: &Path) -> Result<String, TransferError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if !file_name.ends_with(IMPORT_SUFFIX) {
        return Err(TransferError::NotJson { file_name });
    }
    Ok(file_name)
}

pub async fn read_import(path: &Path) -> Result<(String, Vec<u8>), TransferError> {
    let file_name = check_import_path(path)?;
    let read_err = |source| TransferError::Read {
        path: path.display().to_string(),
        source,
    };
    let mut file = File::open(path).await.map_err(read_err)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).await.map_err(read_err)?;
    Ok((file_name, contents))
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("{EXPORT_PREFIX}{}{IMPORT_SUFFIX}", date.format("%Y-%m-%d"))
}

/// Pretty-printed with two-space indentation, keys in backend order.
pub fn render_export(body: &Value) -> Result<String, TransferError> {
    serde_json::to_string_pretty(body).map_err(|source| TransferError::Serialize { source })
}

pub async fn write_export(
    dir: &Path,
    date: NaiveDate,
    body: &Value,
) -> Result<PathBuf, TransferError> {
    let rendered = render_export(body)?;
    let path = dir.join(export_file_name(date));
    let write_err = |source| TransferError::Write {
        path: path.display().to_string(),
        source,
    };
    let mut file = File::create(&path).await.map_err(write_err)?;
    file.write_all(rendered.as_bytes()).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)?;
    tracing::info!(path = %path.display(), "export written");
    Ok(path)
}
