//! Test support for Kaos flow control.
//!
//! - [`clock::ManualClock`]: a [`kaos_shared::Clock`] that only moves when told to
//! - [`reorder::Reorderer`]: reorders stream frame offsets the way a lossy path would

pub mod clock;
pub mod reorder;

pub use clock::ManualClock;
pub use reorder::{ReorderPattern, Reorderer};
