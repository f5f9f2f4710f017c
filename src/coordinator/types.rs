//! Coordinator error and bootstrap-source definitions.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::reconcile::ReconcileError;
use crate::settings::AppSettings;

/// Errors surfaced by the coordinator's public entry points.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Mutation attempted against a read-only settings location.
    #[error("settings location is read-only")]
    ReadOnlySettings,

    /// The durable settings source could not be loaded.
    #[error("settings load failed: {0}")]
    LoadFailed(String),

    /// The coordinator was destroyed or its actor task is gone.
    #[error("settings coordinator is closed")]
    CoordinatorClosed,

    /// A reconciled list carried a duplicate key.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Future resolving the initial settings from a durable location.
pub type SettingsLoadFuture =
    Pin<Box<dyn Future<Output = Result<AppSettings, SettingsError>> + Send>>;

/// Where the coordinator's initial settings come from.
pub enum SettingsSource {
    /// In-memory settings, available immediately, writable.
    Transient(AppSettings),

    /// In-memory settings whose location rejects writes.
    ReadOnly(AppSettings),

    /// A durable location that is loaded asynchronously at bootstrap.
    Loader {
        load: SettingsLoadFuture,
        read_only: bool,
    },
}

impl SettingsSource {
    pub fn loader(
        load: impl Future<Output = Result<AppSettings, SettingsError>> + Send + 'static,
    ) -> Self {
        SettingsSource::Loader {
            load: Box::pin(load),
            read_only: false,
        }
    }

    /// Whether `update_settings` must be rejected.
    pub fn is_read_only(&self) -> bool {
        match self {
            SettingsSource::Transient(_) => false,
            SettingsSource::ReadOnly(_) => true,
            SettingsSource::Loader { read_only, .. } => *read_only,
        }
    }
}
