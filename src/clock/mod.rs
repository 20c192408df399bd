//! Time source abstraction for deterministic tests.

mod clock;

pub use clock::{Clock, ManualClock};
