//! Locally-filed datasets.
//!
//! # Data Flow
//! ```text
//! init()
//!     → loader.rs (read bytes, parse rows)
//!     → optional subset filter
//!     → on_dataset_change callback (rows folded into the snapshot)
//! ```
//!
//! # Design Decisions
//! - One load per file, no periodic rescan
//! - A failed load is logged and never affects sibling files

pub mod loader;
pub mod manager;

pub use loader::{Dataset, DatasetError, DatasetLoader, JsonFileLoader};
pub use manager::{DatasetChangeFn, FileDatasetManager, ManagedDataset, SubsetFilter};
