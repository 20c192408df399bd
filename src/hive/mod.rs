//! The reactive store cell.
//!
//! A [`Hive`] holds one value, notifies subscribers when it changes, and can
//! optionally persist itself through a [`crate::storage::StorageBackend`].
//! Subscriptions come in two lifetimes: strong (RAII guard, deterministic
//! cleanup) and weak (tied to an owner handle, lazily purged).

mod hive;

pub use hive::{Hive, Subscription};
