//! Multi-operation status coordination.
//!
//! The coordinator tracks many named in-flight operations at once, each with
//! a status type drawn from a configured [`StatusKit`]. A single observer
//! subscribes to the coordinator's hive and derives the highest-priority
//! record to render; collaborators fire `operation(name)` transitions from
//! anywhere without coordinating with each other.

mod coordinator;
mod kit;

pub use coordinator::{
    status_slice, OperationHandle, OperationRecord, OperationSnapshot, Status, StatusConfig,
    StatusOptions, DEFAULT_OPERATION,
};
pub(crate) use coordinator::StatusPort;
pub use kit::{StatusEntry, StatusKit};
