//! Reading and parsing dataset files.

use async_trait::async_trait;
use thiserror::Error;

/// In-memory rows of one dataset.
pub type Dataset = Vec<serde_json::Value>;

/// Errors that can occur while loading a dataset file.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read '{uri}': {source}")]
    Read {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{uri}': {reason}")]
    Parse { uri: String, reason: String },
}

/// Reads a dataset URI into rows.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self, uri: &str) -> Result<Dataset, DatasetError>;
}

/// Stock loader for JSON files: either a top-level array of objects or
/// newline-delimited JSON.
pub struct JsonFileLoader;

#[async_trait]
impl DatasetLoader for JsonFileLoader {
    async fn load(&self, uri: &str) -> Result<Dataset, DatasetError> {
        let bytes = tokio::fs::read(uri).await.map_err(|source| DatasetError::Read {
            uri: uri.to_string(),
            source,
        })?;
        parse_rows(uri, &bytes)
    }
}

fn parse_rows(uri: &str, bytes: &[u8]) -> Result<Dataset, DatasetError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DatasetError::Parse {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    let trimmed = text.trim_start();

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| DatasetError::Parse {
            uri: uri.to_string(),
            reason: e.to_string(),
        });
    }

    // newline-delimited JSON
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row = serde_json::from_str(line).map_err(|e| DatasetError::Parse {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}
