//! Generic keyed-list reconciliation.
//!
//! # Data Flow
//! ```text
//! (initial list, updated list)
//!     → diff.rs (build key lookup, walk updated list)
//!     → on_enter / on_update / on_exit callbacks
//! ```
//!
//! # Design Decisions
//! - Pure and synchronous; all side effects happen through the callbacks
//! - A duplicate key in the initial list is a configuration error and is
//!   reported before any callback fires

pub mod diff;

pub use diff::{reconcile, reconcile_named, Named, ReconcileError};
