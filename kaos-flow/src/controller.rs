//! Per-scope flow controller.
//!
//! One instance per stream and one for the connection (stream id 0). Tracks
//! how far this endpoint may send and how far the peer may send, and
//! auto-tunes the receive window increment against the smoothed RTT.
//!
//! ```text
//!            bytes_read        receive_window
//!                │                   │
//!  ──────────────┼─────────┬─────────┼──────────▶ offset
//!                │◀─ remaining ─────▶│
//!                          │
//!                   highest_received (must stay ≤ receive_window)
//! ```
//!
//! A window update is due once `remaining` drops below half the increment.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use kaos_shared::{ByteCount, Clock, Scope, StreamId};

use crate::error::{FlowControlError, Result};
use crate::params::ParametersSource;
use crate::rtt::RttEstimator;

/// Announce a new window once less than `increment / WINDOW_UPDATE_THRESHOLD` remains.
const WINDOW_UPDATE_THRESHOLD: ByteCount = 2;
/// Growth factor applied to the increment when updates come too fast.
const WINDOW_INCREMENT_GROWTH: ByteCount = 2;
/// Updates closer together than this many smoothed RTTs trigger growth.
const WINDOW_UPDATE_RTT_MULTIPLE: u32 = 2;

/// Flow controller for one stream or for the whole connection.
///
/// Not synchronized: the owning stream or connection state machine mutates
/// it under whatever exclusion it already holds.
pub struct FlowController {
    stream_id: StreamId,

    params: Arc<dyn ParametersSource>,
    rtt: Arc<dyn RttEstimator>,
    clock: Arc<dyn Clock>,

    bytes_sent: ByteCount,
    /// Highest offset the peer allowed us; 0 until the first window update
    send_window: ByteCount,

    last_window_update: Option<Instant>,

    bytes_read: ByteCount,
    highest_received: ByteCount,
    receive_window: ByteCount,
    receive_window_increment: ByteCount,
    max_receive_window_increment: ByteCount,
}

impl FlowController {
    pub fn new(
        stream_id: StreamId,
        params: Arc<dyn ParametersSource>,
        rtt: Arc<dyn RttEstimator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scope = Scope::of(stream_id);
        let receive_window = params.initial_window(scope);
        let max_receive_window_increment = params.max_window_increment(scope);

        Self {
            stream_id,
            params,
            rtt,
            clock,
            bytes_sent: 0,
            send_window: 0,
            last_window_update: None,
            bytes_read: 0,
            highest_received: 0,
            receive_window,
            receive_window_increment: receive_window,
            max_receive_window_increment,
        }
    }

    #[inline]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    #[inline]
    pub fn scope(&self) -> Scope {
        Scope::of(self.stream_id)
    }

    // ---- send side ----

    #[inline]
    pub fn add_bytes_sent(&mut self, n: ByteCount) {
        self.bytes_sent += n;
    }

    /// Bytes that may still be sent. Never underflows.
    pub fn send_window_size(&self) -> ByteCount {
        self.effective_send_window().saturating_sub(self.bytes_sent)
    }

    /// Absolute send offset limit.
    pub fn send_window_offset(&self) -> ByteCount {
        self.effective_send_window()
    }

    /// Apply a window update from the peer.
    ///
    /// Returns true if the window grew, i.e. blocked senders should be woken.
    /// Stale or reordered updates are ignored.
    pub fn update_send_window(&mut self, new_offset: ByteCount) -> bool {
        if new_offset > self.send_window {
            self.send_window = new_offset;
            true
        } else {
            false
        }
    }

    fn effective_send_window(&self) -> ByteCount {
        if self.send_window == 0 {
            self.params.initial_send_window(self.scope())
        } else {
            self.send_window
        }
    }

    // ---- receive side ----

    /// Record the end offset of a received stream frame.
    ///
    /// Stream scope only. Returns the increment to forward to the connection
    /// controller. [`FlowControlError::ReceivedSmallerOffset`] is expected for
    /// reordered frames and must be ignored there; it only matters when the
    /// offset comes from a stream reset.
    pub fn update_highest_received(&mut self, byte_offset: ByteCount) -> Result<ByteCount> {
        debug_assert!(
            !self.scope().is_connection(),
            "update_highest_received called on the connection flow controller"
        );

        if byte_offset == self.highest_received {
            return Ok(0);
        }
        if byte_offset > self.highest_received {
            let increment = byte_offset - self.highest_received;
            self.highest_received = byte_offset;
            return Ok(increment);
        }
        Err(FlowControlError::ReceivedSmallerOffset)
    }

    /// Add a stream's increment to the connection total.
    ///
    /// Connection scope only.
    pub fn increment_highest_received(&mut self, increment: ByteCount) {
        debug_assert!(
            self.scope().is_connection(),
            "increment_highest_received called on stream {}",
            self.stream_id
        );
        self.highest_received += increment;
    }

    #[inline]
    pub fn add_bytes_read(&mut self, n: ByteCount) {
        self.bytes_read += n;
    }

    /// Extend the receive window if more than half the increment is consumed.
    ///
    /// Returns the new absolute offset to announce to the peer.
    pub fn maybe_update_window(&mut self) -> Option<ByteCount> {
        let remaining = self.receive_window.saturating_sub(self.bytes_read);

        // Chromium uses the same threshold
        if remaining >= self.receive_window_increment / WINDOW_UPDATE_THRESHOLD {
            return None;
        }

        self.maybe_adjust_window_increment();
        self.last_window_update = Some(self.clock.now());
        self.receive_window = self.bytes_read + self.receive_window_increment;

        trace_debug!(
            "stream {} announcing receive window {}",
            self.stream_id,
            self.receive_window
        );
        Some(self.receive_window)
    }

    /// Double the increment if window updates are more frequent than every 2 RTTs.
    fn maybe_adjust_window_increment(&mut self) {
        let Some(last_update) = self.last_window_update else {
            return;
        };

        let rtt = self.rtt.smoothed_rtt();
        if rtt.is_zero() {
            return;
        }

        let since_last_update = self.clock.now().saturating_duration_since(last_update);
        if since_last_update >= rtt * WINDOW_UPDATE_RTT_MULTIPLE {
            return;
        }

        let old_increment = self.receive_window_increment;
        self.receive_window_increment = old_increment
            .saturating_mul(WINDOW_INCREMENT_GROWTH)
            .min(self.max_receive_window_increment);

        if old_increment < self.receive_window_increment {
            if self.scope().is_connection() {
                trace_debug!(
                    "increasing receive flow control window for the connection to {} kB",
                    self.receive_window_increment / kaos_shared::KIB
                );
            } else {
                trace_debug!(
                    "increasing receive flow control window increment for stream {} to {} kB",
                    self.stream_id,
                    self.receive_window_increment / kaos_shared::KIB
                );
            }
        }
    }

    /// True if the peer sent beyond the window we granted.
    #[inline]
    pub fn check_flow_control_violation(&self) -> bool {
        self.highest_received > self.receive_window
    }

    // ---- accessors ----

    pub fn bytes_sent(&self) -> ByteCount {
        self.bytes_sent
    }

    pub fn bytes_read(&self) -> ByteCount {
        self.bytes_read
    }

    pub fn highest_received(&self) -> ByteCount {
        self.highest_received
    }

    pub fn receive_window(&self) -> ByteCount {
        self.receive_window
    }

    pub fn receive_window_increment(&self) -> ByteCount {
        self.receive_window_increment
    }

    pub fn max_receive_window_increment(&self) -> ByteCount {
        self.max_receive_window_increment
    }
}

impl fmt::Debug for FlowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowController")
            .field("stream_id", &self.stream_id)
            .field("bytes_sent", &self.bytes_sent)
            .field("send_window", &self.send_window)
            .field("bytes_read", &self.bytes_read)
            .field("highest_received", &self.highest_received)
            .field("receive_window", &self.receive_window)
            .field("receive_window_increment", &self.receive_window_increment)
            .field("max_receive_window_increment", &self.max_receive_window_increment)
            .finish_non_exhaustive()
    }
}
