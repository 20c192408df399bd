//! Pluggable key/value persistence for hives.
//!
//! Backends store whole-value JSON snapshots under opaque string keys.
//! Durability is best-effort: a backend never panics on a missing key and
//! handles its own I/O failures.

mod backend;

pub use backend::{FileStorage, MemoryStorage, StorageBackend};
