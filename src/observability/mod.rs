//! Observability subsystem.
//!
//! # Design Decisions
//! - All modules log through the tracing crate with structured fields
//! - Subscriber initialization lives here so binaries and tests share it;
//!   the library itself never installs a subscriber

pub mod logging;
