//! Slice composition.
//!
//! A [`Factory`] folds independently-authored slice functions into one
//! shared [`Context`]. Ordering is the only dependency mechanism: a slice
//! sees exactly the capabilities installed by the slices declared before
//! it, and a read of anything else fails fast.

mod factory;

pub use factory::{ComposeError, Context, Factory, Registrations};
