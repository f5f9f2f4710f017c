//! Per-source query executor handed out to data sources.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::transport::types::{QueryTransport, TransportResult};

/// A live query handle binding one cluster's transport to a source locator.
///
/// Cheap to clone; all clones share the underlying transport. Equality and
/// serialization of the owning data source ignore the executor entirely.
#[derive(Clone)]
pub struct QueryExecutor {
    cluster: String,
    source: String,
    transport: Arc<dyn QueryTransport>,
}

impl QueryExecutor {
    pub fn new(cluster: impl Into<String>, source: impl Into<String>, transport: Arc<dyn QueryTransport>) -> Self {
        Self {
            cluster: cluster.into(),
            source: source.into(),
            transport,
        }
    }

    /// Name of the cluster this executor queries through.
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Locator of the source this executor is bound to.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Execute a query against the bound source.
    pub async fn execute(&self, query: &serde_json::Value) -> TransportResult<serde_json::Value> {
        self.transport.execute(&self.source, query).await
    }

    /// Derive the latest-data boundary of the bound source.
    pub async fn max_time(&self) -> TransportResult<DateTime<Utc>> {
        self.transport.max_time(&self.source).await
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("cluster", &self.cluster)
            .field("source", &self.source)
            .finish()
    }
}
