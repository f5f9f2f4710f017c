//! The settings coordinator.
//!
//! # Data Flow
//! ```text
//! add_cluster / add_data_source / change_settings / update_settings
//!     → actor.rs (single-writer task owning the snapshot)
//!     → reconcile clusters and native sources against the previous snapshot
//!     → cluster controllers / file dataset managers created and destroyed
//!     → discovery callbacks arrive as messages on the same queue
//!     → snapshot replaced copy-on-write, published on a watch channel
//! ```
//!
//! # Design Decisions
//! - One actor task owns the snapshot exclusively; explicit changes and
//!   discovery results are serialized on one queue, so a later message
//!   always observes the fully-applied effect of an earlier one
//! - Reads never block the writer: the snapshot is published on a watch
//!   channel and handed out as a complete value
//! - Waiting for initial load is bounded by a timeout and never fatal

pub mod actor;
pub mod handle;
pub mod types;

pub use handle::{CoordinatorOptions, SettingsCoordinator};
pub use types::{SettingsError, SettingsLoadFuture, SettingsSource};
