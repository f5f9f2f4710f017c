//! Per-cluster connection and introspection control.
//!
//! # Data Flow
//! ```text
//! init()
//!     → retry.rs (connect with unbounded retry)
//!     → introspect pre-existing managed externals
//!     → one source-list scan
//!     → timers: periodic scan / periodic re-introspection
//!     → on_external_change callback (schema folded into the snapshot)
//! ```
//!
//! # Design Decisions
//! - Connection retries never give up; a cluster that is unreachable at boot
//!   becomes usable the moment it comes up
//! - One introspection failure never aborts sibling sources
//! - Timers and the retry loop share one cancellation token, so destroy()
//!   interrupts an in-flight retry wait

pub mod controller;
pub mod external;
pub mod retry;

pub use controller::{ClusterController, ControllerState, ExternalChangeFn, ExternalNameFn};
pub use external::{default_external_name, External, ManagedExternal};
pub use retry::{connection_retry_delay_ms, CONNECTION_RETRY_TIMEOUT_MS};
