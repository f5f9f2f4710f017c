//! Startup-time registration of transport constructors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::settings::Cluster;
use crate::transport::types::{QueryTransport, TransportError, TransportKind, TransportResult};

/// Constructor for one transport kind. Must not perform network I/O.
pub type TransportFactory = Arc<dyn Fn(&Cluster) -> Arc<dyn QueryTransport> + Send + Sync>;

/// Maps a cluster's declared kind to its registered constructor.
///
/// Populated once at startup by the bootstrap layer; cloned freely after.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: HashMap<TransportKind, TransportFactory>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for one kind, replacing any previous one.
    pub fn register<F>(&mut self, kind: TransportKind, factory: F)
    where
        F: Fn(&Cluster) -> Arc<dyn QueryTransport> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Build a transport for the given cluster.
    pub fn build(&self, cluster: &Cluster) -> TransportResult<Arc<dyn QueryTransport>> {
        let factory = self
            .factories
            .get(&cluster.kind)
            .ok_or(TransportError::UnknownKind(cluster.kind))?;
        Ok(factory(cluster))
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
