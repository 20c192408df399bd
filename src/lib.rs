//! # Apiary
//!
//! A reactive state layer built from composable slices.
//!
//! Apiary provides three primitives and a set of slices built on them:
//!
//! ## Hive (store cell)
//!
//! The observable value cell everything else is made of:
//! - `Hive<T>` - holds one value, notifies subscribers on change
//! - Strong (RAII) and weak (owner-tied) subscription lifetimes
//! - Optional durable backing through a pluggable storage backend
//!
//! ## Factory (slice composition)
//!
//! Merges independently-authored slices into one shared context:
//! - `Factory` - installs slice functions, runs them in declaration order
//! - `Context` - the resulting capability set; forward references fail fast
//!
//! ## Status coordinator
//!
//! Tracks many named in-flight operations at once:
//! - `Status` - per-operation records, priority resolution, timeouts
//! - `StatusKit` - the configured status types and their renderers
//!
//! The `slices` module layers query, loader, paginator, table, and exporter
//! capabilities on top of these.

pub mod clock;
pub mod factory;
pub mod hive;
pub mod slices;
pub mod status;
pub mod storage;

// Re-export main types for convenience
pub use factory::{ComposeError, Context, Factory, Registrations};
pub use hive::{Hive, Subscription};
pub use status::{status_slice, OperationRecord, Status, StatusConfig, StatusKit, StatusOptions};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
