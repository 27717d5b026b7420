//! Injectable time source.

use std::time::Instant;

/// Source of the current time.
///
/// Flow control never samples wall-clock time directly; it asks a `Clock`.
/// Production code uses [`SystemClock`], tests substitute a manual clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}
