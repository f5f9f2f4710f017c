//! Sourcekeeper: declarative synchronization of live data connections.
//!
//! Given a desired-state description of clusters and data sources, the crate
//! keeps a set of managed connections in step with it: it diffs old and new
//! configuration into create/update/destroy operations, drives per-cluster
//! connection establishment with indefinite retry, periodically rediscovers
//! and re-introspects sources, and folds discovered facts back into a single
//! shared settings snapshot.

pub mod cluster;
pub mod coordinator;
pub mod dataset;
pub mod observability;
pub mod reconcile;
pub mod settings;
pub mod transport;

pub use coordinator::{CoordinatorOptions, SettingsCoordinator, SettingsSource};
pub use settings::AppSettings;
