//! Round-trip time estimation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Smoothed RTT provider read by the receive window auto-tuning.
pub trait RttEstimator: Send + Sync {
    /// Current smoothed RTT; zero until the first sample.
    fn smoothed_rtt(&self) -> Duration;
}

const NO_SAMPLE: u64 = u64::MAX;

/// Per-connection RTT statistics.
///
/// One writer (the connection's ACK processing) calls [`RttStats::update`];
/// every flow controller of the connection reads through an `Arc`.
#[derive(Debug)]
pub struct RttStats {
    /// Latest sample (microseconds)
    latest_us: AtomicU64,
    /// EWMA-smoothed RTT (microseconds), 0 before any sample
    smoothed_us: AtomicU64,
    /// Minimum observed (microseconds)
    min_us: AtomicU64,
}

impl Default for RttStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RttStats {
    pub fn new() -> Self {
        Self {
            latest_us: AtomicU64::new(0),
            smoothed_us: AtomicU64::new(0),
            min_us: AtomicU64::new(NO_SAMPLE),
        }
    }

    /// Feed an RTT sample.
    pub fn update(&self, sample: Duration) {
        let sample_us = sample.as_micros().min(u64::MAX as u128) as u64;
        self.latest_us.store(sample_us, Ordering::Relaxed);

        if sample_us < self.min_us.load(Ordering::Relaxed) {
            self.min_us.store(sample_us, Ordering::Relaxed);
        }

        let smoothed = self.smoothed_us.load(Ordering::Relaxed);
        let next = if smoothed == 0 {
            sample_us
        } else {
            // EWMA: srtt = 0.875 * srtt + 0.125 * sample
            (smoothed.saturating_mul(7).saturating_add(sample_us)) / 8
        };
        self.smoothed_us.store(next, Ordering::Release);
    }

    pub fn latest_rtt(&self) -> Duration {
        Duration::from_micros(self.latest_us.load(Ordering::Relaxed))
    }

    /// Zero until the first sample.
    pub fn min_rtt(&self) -> Duration {
        match self.min_us.load(Ordering::Relaxed) {
            NO_SAMPLE => Duration::ZERO,
            us => Duration::from_micros(us),
        }
    }
}

impl RttEstimator for RttStats {
    fn smoothed_rtt(&self) -> Duration {
        Duration::from_micros(self.smoothed_us.load(Ordering::Acquire))
    }
}
