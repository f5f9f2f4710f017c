//! Settings data model.
//!
//! # Responsibilities
//! - Define the cluster and data-source entities and their aggregate root
//! - Provide copy-on-write operations over the aggregate
//! - Validate a snapshot before it is adopted
//!
//! # Design Decisions
//! - Entities are immutable values, replaced wholesale on update
//! - The aggregate is only ever replaced as a unit, never field-mutated, so
//!   readers observe a fully-old or fully-new snapshot

pub mod refresh;
pub mod schema;

pub use refresh::{MaxTime, RefreshRule};
pub use schema::{
    AppSettings, Attribute, AttributeKind, Cluster, ClusterAuth, DataSource, SettingsValidationError,
    SourceListScan, SourceOptions, NATIVE_ENGINE,
};
