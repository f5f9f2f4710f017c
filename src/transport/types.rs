//! Transport trait, kinds, and error definitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::Attribute;

/// The closed set of cluster technologies a transport can speak to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Druid,
    Postgres,
    Mysql,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Druid => write!(f, "druid"),
            TransportKind::Postgres => write!(f, "postgres"),
            TransportKind::Mysql => write!(f, "mysql"),
        }
    }
}

/// Errors that can occur during transport operations.
///
/// `Display` and `Error` are implemented by hand because the `Introspection`
/// variant's `source` field is a plain `String`; `thiserror` would infer it
/// as the error source and require it to implement `Error`.
#[derive(Debug)]
pub enum TransportError {
    /// Connection or version probe failed. Transient; callers retry.
    Connection(String),

    /// Introspection of a single source failed. Scoped to that source.
    Introspection { source: String, reason: String },

    /// Query execution failed.
    Query(String),

    /// No constructor is registered for the cluster's declared kind.
    UnknownKind(TransportKind),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connection(msg) => write!(f, "connection error: {msg}"),
            TransportError::Introspection { source, reason } => {
                write!(f, "introspection of '{source}' failed: {reason}")
            }
            TransportError::Query(msg) => write!(f, "query error: {msg}"),
            TransportError::UnknownKind(kind) => {
                write!(f, "no transport registered for {kind} clusters")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Operations every cluster technology exposes.
///
/// Implementations are built up-front without network I/O; the first probe
/// happens when a controller calls [`get_version`](QueryTransport::get_version).
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Probe the backend and return its version string.
    async fn get_version(&self) -> TransportResult<String>;

    /// List the names of all sources the backend currently exposes.
    async fn list_sources(&self) -> TransportResult<Vec<String>>;

    /// Fetch the attribute list of one source.
    async fn introspect(&self, source: &str) -> TransportResult<Vec<Attribute>>;

    /// Execute a query against one source.
    async fn execute(&self, source: &str, query: &serde_json::Value)
        -> TransportResult<serde_json::Value>;

    /// Derive the latest-data boundary of one source.
    async fn max_time(&self, source: &str) -> TransportResult<DateTime<Utc>>;
}
