//! The file dataset manager: one load-and-publish lifecycle per file.

use std::sync::Arc;

use crate::dataset::loader::{Dataset, DatasetLoader};
use crate::settings::DataSource;

/// Invoked when a dataset finishes loading.
pub type DatasetChangeFn = Arc<dyn Fn(String, Dataset) + Send + Sync>;

/// Row predicate applied at load time.
pub type SubsetFilter = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

/// A manager's record for one local file.
#[derive(Clone)]
pub struct ManagedDataset {
    pub name: String,
    pub uri: String,

    /// Loaded rows, absent until the load completes.
    pub dataset: Option<Dataset>,

    /// Optional row filter applied at load time.
    pub subset: Option<SubsetFilter>,
}

impl ManagedDataset {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            dataset: None,
            subset: None,
        }
    }

    pub fn from_data_source(data_source: &DataSource) -> Self {
        Self::new(data_source.name.clone(), data_source.source.clone())
    }

    pub fn with_subset(mut self, subset: SubsetFilter) -> Self {
        self.subset = Some(subset);
        self
    }
}

impl std::fmt::Debug for ManagedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedDataset")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("loaded", &self.dataset.is_some())
            .field("filtered", &self.subset.is_some())
            .finish()
    }
}

/// Owns the load lifecycle of a set of local files.
pub struct FileDatasetManager {
    names: Vec<String>,
    managed: Arc<tokio::sync::Mutex<Vec<ManagedDataset>>>,
    loader: Arc<dyn DatasetLoader>,
    on_dataset_change: DatasetChangeFn,
}

impl FileDatasetManager {
    pub fn new(
        managed: Vec<ManagedDataset>,
        loader: Arc<dyn DatasetLoader>,
        on_dataset_change: DatasetChangeFn,
    ) -> Self {
        Self {
            names: managed.iter().map(|m| m.name.clone()).collect(),
            managed: Arc::new(tokio::sync::Mutex::new(managed)),
            loader,
            on_dataset_change,
        }
    }

    /// Display names of the managed files, fixed at construction.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn manages(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Kick off one load task per managed file and return.
    ///
    /// Completion is observed only through `on_dataset_change`: init itself
    /// resolves before any file has loaded. Callers that need the rows must
    /// wait for the callback.
    pub async fn init(&self) {
        let descriptors: Vec<(String, String)> = {
            let managed = self.managed.lock().await;
            managed.iter().map(|m| (m.name.clone(), m.uri.clone())).collect()
        };

        for (name, uri) in descriptors {
            let loader = Arc::clone(&self.loader);
            let managed = Arc::clone(&self.managed);
            let on_dataset_change = Arc::clone(&self.on_dataset_change);
            tokio::spawn(async move {
                match loader.load(&uri).await {
                    Ok(rows) => {
                        let rows = {
                            let mut managed = managed.lock().await;
                            let Some(entry) = managed.iter_mut().find(|m| m.name == name) else {
                                return;
                            };
                            let rows = match &entry.subset {
                                Some(subset) => rows.into_iter().filter(|r| subset(r)).collect(),
                                None => rows,
                            };
                            entry.dataset = Some(rows.clone());
                            rows
                        };
                        tracing::info!(name = %name, uri = %uri, rows = rows.len(), "Dataset loaded");
                        on_dataset_change(name, rows);
                    }
                    Err(error) => {
                        tracing::warn!(name = %name, uri = %uri, error = %error, "Dataset load failed");
                    }
                }
            });
        }
    }

    /// Current rows of one managed dataset, if its load has completed.
    pub async fn dataset(&self, name: &str) -> Option<Dataset> {
        self.managed
            .lock()
            .await
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.dataset.clone())
    }

    /// Release resources. Idempotent; in-flight loads are left to finish and
    /// publish through the callback.
    pub fn destroy(&self) {
        tracing::debug!(datasets = self.names.len(), "File dataset manager destroyed");
    }
}
