//! Query transports for cluster-backed sources.
//!
//! # Responsibilities
//! - Define the operations every cluster technology must expose
//! - Map a cluster's declared kind to a registered transport constructor
//! - Wrap a live transport in a per-source query executor
//!
//! # Design Decisions
//! - Transport kinds are a closed enum, not runtime-loaded modules;
//!   technology-specific constructors are registered at startup
//! - Building a transport performs no network I/O

pub mod executor;
pub mod registry;
pub mod types;

pub use executor::QueryExecutor;
pub use registry::{TransportFactory, TransportRegistry};
pub use types::{QueryTransport, TransportError, TransportKind, TransportResult};
