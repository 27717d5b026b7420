//! Connection-wide flow control.
//!
//! Owns the connection controller and one controller per open stream, and
//! keeps the two levels consistent: every stream increment is computed
//! first and then forwarded to the connection exactly once.
//!
//! ## Example
//!
//! ```rust
//! use kaos_flow::{ConnectionParameters, FlowConfig, FlowControlManager, RttStats};
//! use kaos_shared::SystemClock;
//! use std::sync::Arc;
//!
//! let params = Arc::new(ConnectionParameters::new(FlowConfig::default()).unwrap());
//! let mut flow = FlowControlManager::new(params, Arc::new(RttStats::new()), Arc::new(SystemClock));
//!
//! flow.new_stream(5, true);
//! flow.update_highest_received(5, 1200).unwrap();
//! flow.add_bytes_read(5, 1200).unwrap();
//! for update in flow.window_updates() {
//!     // emit a window update frame for update.stream_id / update.offset
//!     let _ = update;
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use kaos_shared::{ByteCount, Clock, StreamId, CONNECTION_STREAM_ID};

use crate::controller::FlowController;
use crate::error::{FlowControlError, Result};
use crate::params::ParametersSource;
use crate::rtt::RttEstimator;

/// A receive window extension to announce to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdate {
    /// Stream the update is for (0 = connection)
    pub stream_id: StreamId,
    /// New absolute offset the peer may send up to
    pub offset: ByteCount,
}

struct StreamFlow {
    controller: FlowController,
    /// Control streams are exempt from connection-level accounting
    contributes_to_connection: bool,
}

/// Flow control for one connection and all of its streams.
pub struct FlowControlManager {
    params: Arc<dyn ParametersSource>,
    rtt: Arc<dyn RttEstimator>,
    clock: Arc<dyn Clock>,
    connection: FlowController,
    streams: HashMap<StreamId, StreamFlow>,
}

impl FlowControlManager {
    pub fn new(
        params: Arc<dyn ParametersSource>,
        rtt: Arc<dyn RttEstimator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let connection = FlowController::new(
            CONNECTION_STREAM_ID,
            params.clone(),
            rtt.clone(),
            clock.clone(),
        );
        Self {
            params,
            rtt,
            clock,
            connection,
            streams: HashMap::new(),
        }
    }

    /// Start tracking a stream. Opening an already tracked stream is a no-op.
    pub fn new_stream(&mut self, stream_id: StreamId, contributes_to_connection: bool) {
        debug_assert_ne!(stream_id, CONNECTION_STREAM_ID);
        if self.streams.contains_key(&stream_id) {
            return;
        }
        let controller = FlowController::new(
            stream_id,
            self.params.clone(),
            self.rtt.clone(),
            self.clock.clone(),
        );
        self.streams.insert(
            stream_id,
            StreamFlow {
                controller,
                contributes_to_connection,
            },
        );
    }

    /// Stop tracking a closed stream. Returns false if it was unknown.
    pub fn remove_stream(&mut self, stream_id: StreamId) -> bool {
        self.streams.remove(&stream_id).is_some()
    }

    pub fn has_stream(&self, stream_id: StreamId) -> bool {
        self.streams.contains_key(&stream_id)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Account for a stream frame ending at `byte_offset`.
    ///
    /// Reordered frames (smaller offsets) are ignored. Exceeding either the
    /// stream or the connection window is a [`FlowControlError::FlowControlViolation`].
    pub fn update_highest_received(
        &mut self,
        stream_id: StreamId,
        byte_offset: ByteCount,
    ) -> Result<()> {
        let stream = self
            .streams
            .get_mut(&stream_id)
            .ok_or(FlowControlError::UnknownStream(stream_id))?;

        let increment = match stream.controller.update_highest_received(byte_offset) {
            Ok(increment) => increment,
            Err(FlowControlError::ReceivedSmallerOffset) => return Ok(()),
            Err(e) => return Err(e),
        };
        account_received(stream, &mut self.connection, increment)
    }

    /// Account for the final offset carried by a stream reset.
    ///
    /// Unlike data frames, a final offset below what was already received
    /// means the peer sent data past the end of the stream.
    pub fn reset_stream(&mut self, stream_id: StreamId, final_offset: ByteCount) -> Result<()> {
        let stream = self
            .streams
            .get_mut(&stream_id)
            .ok_or(FlowControlError::UnknownStream(stream_id))?;

        let increment = match stream.controller.update_highest_received(final_offset) {
            Ok(increment) => increment,
            Err(FlowControlError::ReceivedSmallerOffset) => {
                trace_warn!(
                    "stream {} reset at {} below received offset {}",
                    stream_id,
                    final_offset,
                    stream.controller.highest_received()
                );
                return Err(FlowControlError::DataAfterTermination { stream_id });
            }
            Err(e) => return Err(e),
        };
        account_received(stream, &mut self.connection, increment)
    }

    /// Record bytes consumed by the application.
    pub fn add_bytes_read(&mut self, stream_id: StreamId, n: ByteCount) -> Result<()> {
        let stream = self
            .streams
            .get_mut(&stream_id)
            .ok_or(FlowControlError::UnknownStream(stream_id))?;

        stream.controller.add_bytes_read(n);
        if stream.contributes_to_connection {
            self.connection.add_bytes_read(n);
        }
        Ok(())
    }

    /// Record bytes handed to the sender.
    pub fn add_bytes_sent(&mut self, stream_id: StreamId, n: ByteCount) -> Result<()> {
        let stream = self
            .streams
            .get_mut(&stream_id)
            .ok_or(FlowControlError::UnknownStream(stream_id))?;

        stream.controller.add_bytes_sent(n);
        if stream.contributes_to_connection {
            self.connection.add_bytes_sent(n);
        }
        Ok(())
    }

    /// Bytes the stream may send now, limited by the connection window.
    pub fn send_window_size(&self, stream_id: StreamId) -> Result<ByteCount> {
        if stream_id == CONNECTION_STREAM_ID {
            return Ok(self.remaining_connection_window());
        }
        let stream = self
            .streams
            .get(&stream_id)
            .ok_or(FlowControlError::UnknownStream(stream_id))?;

        let stream_window = stream.controller.send_window_size();
        if stream.contributes_to_connection {
            Ok(stream_window.min(self.remaining_connection_window()))
        } else {
            Ok(stream_window)
        }
    }

    pub fn remaining_connection_window(&self) -> ByteCount {
        self.connection.send_window_size()
    }

    /// Apply a window update received from the peer; stream id 0 targets the connection.
    ///
    /// Returns true if the window grew.
    pub fn update_window(&mut self, stream_id: StreamId, offset: ByteCount) -> Result<bool> {
        let controller = self.controller_mut(stream_id)?;
        Ok(controller.update_send_window(offset))
    }

    /// Poll every controller for window updates that are due.
    ///
    /// Streams are reported in id order, the connection last.
    pub fn window_updates(&mut self) -> Vec<WindowUpdate> {
        let mut updates: Vec<WindowUpdate> = self
            .streams
            .iter_mut()
            .filter_map(|(&stream_id, stream)| {
                stream
                    .controller
                    .maybe_update_window()
                    .map(|offset| WindowUpdate { stream_id, offset })
            })
            .collect();
        updates.sort_unstable_by_key(|u| u.stream_id);

        if let Some(offset) = self.connection.maybe_update_window() {
            updates.push(WindowUpdate {
                stream_id: CONNECTION_STREAM_ID,
                offset,
            });
        }
        updates
    }

    /// Current receive window offset; stream id 0 targets the connection.
    pub fn receive_window(&self, stream_id: StreamId) -> Result<ByteCount> {
        Ok(self.controller(stream_id)?.receive_window())
    }

    pub fn connection(&self) -> &FlowController {
        &self.connection
    }

    /// Controller for a stream, or the connection for stream id 0.
    pub fn controller(&self, stream_id: StreamId) -> Result<&FlowController> {
        if stream_id == CONNECTION_STREAM_ID {
            return Ok(&self.connection);
        }
        self.streams
            .get(&stream_id)
            .map(|s| &s.controller)
            .ok_or(FlowControlError::UnknownStream(stream_id))
    }

    fn controller_mut(&mut self, stream_id: StreamId) -> Result<&mut FlowController> {
        if stream_id == CONNECTION_STREAM_ID {
            return Ok(&mut self.connection);
        }
        self.streams
            .get_mut(&stream_id)
            .map(|s| &mut s.controller)
            .ok_or(FlowControlError::UnknownStream(stream_id))
    }
}

/// Forward a stream increment to the connection and check both windows.
fn account_received(
    stream: &mut StreamFlow,
    connection: &mut FlowController,
    increment: ByteCount,
) -> Result<()> {
    if stream.controller.check_flow_control_violation() {
        return Err(violation(&stream.controller));
    }
    if stream.contributes_to_connection {
        connection.increment_highest_received(increment);
        if connection.check_flow_control_violation() {
            return Err(violation(connection));
        }
    }
    Ok(())
}

fn violation(controller: &FlowController) -> FlowControlError {
    trace_warn!(
        "flow control violation on stream {}: received {} > window {}",
        controller.stream_id(),
        controller.highest_received(),
        controller.receive_window()
    );
    FlowControlError::FlowControlViolation {
        stream_id: controller.stream_id(),
        highest_received: controller.highest_received(),
        receive_window: controller.receive_window(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ConnectionParameters, FlowConfig};
    use crate::rtt::RttStats;
    use kaos_test_support::ManualClock;

    fn manager() -> FlowControlManager {
        let params = Arc::new(ConnectionParameters::new(FlowConfig::for_testing()).unwrap());
        FlowControlManager::new(
            params,
            Arc::new(RttStats::new()),
            Arc::new(ManualClock::new()),
        )
    }

    #[test]
    fn test_new_and_remove_stream() {
        let mut fc = manager();
        fc.new_stream(5, true);
        fc.new_stream(5, true);
        assert_eq!(fc.stream_count(), 1);
        assert!(fc.has_stream(5));
        assert!(fc.remove_stream(5));
        assert!(!fc.remove_stream(5));
        assert_eq!(
            fc.add_bytes_read(5, 1),
            Err(FlowControlError::UnknownStream(5))
        );
    }

    #[test]
    fn test_stream_increment_reaches_connection() {
        let mut fc = manager();
        fc.new_stream(5, true);
        fc.new_stream(7, true);
        fc.update_highest_received(5, 40).unwrap();
        fc.update_highest_received(7, 30).unwrap();
        fc.update_highest_received(5, 60).unwrap();
        assert_eq!(fc.connection().highest_received(), 90);
    }

    #[test]
    fn test_reordered_frame_not_double_counted() {
        let mut fc = manager();
        fc.new_stream(5, true);
        fc.update_highest_received(5, 60).unwrap();
        fc.update_highest_received(5, 30).unwrap();
        fc.update_highest_received(5, 60).unwrap();
        assert_eq!(fc.controller(5).unwrap().highest_received(), 60);
        assert_eq!(fc.connection().highest_received(), 60);
    }

    #[test]
    fn test_non_contributing_stream_skips_connection() {
        let mut fc = manager();
        fc.new_stream(1, false);
        fc.update_highest_received(1, 80).unwrap();
        fc.add_bytes_read(1, 80).unwrap();
        fc.add_bytes_sent(1, 10).unwrap();
        assert_eq!(fc.connection().highest_received(), 0);
        assert_eq!(fc.connection().bytes_read(), 0);
        assert_eq!(fc.remaining_connection_window(), 150);
        assert_eq!(fc.send_window_size(1).unwrap(), 90);
    }

    #[test]
    fn test_stream_violation() {
        let mut fc = manager();
        fc.new_stream(5, true);
        assert_eq!(
            fc.update_highest_received(5, 101),
            Err(FlowControlError::FlowControlViolation {
                stream_id: 5,
                highest_received: 101,
                receive_window: 100,
            })
        );
    }

    #[test]
    fn test_connection_violation() {
        let mut fc = manager();
        fc.new_stream(5, true);
        fc.new_stream(7, true);
        fc.update_highest_received(5, 100).unwrap();
        let err = fc.update_highest_received(7, 51).unwrap_err();
        assert_eq!(
            err,
            FlowControlError::FlowControlViolation {
                stream_id: 0,
                highest_received: 151,
                receive_window: 150,
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_reset_below_received_is_fatal() {
        let mut fc = manager();
        fc.new_stream(5, true);
        fc.update_highest_received(5, 50).unwrap();
        assert_eq!(
            fc.reset_stream(5, 40),
            Err(FlowControlError::DataAfterTermination { stream_id: 5 })
        );
    }

    #[test]
    fn test_reset_counts_final_offset() {
        let mut fc = manager();
        fc.new_stream(5, true);
        fc.update_highest_received(5, 50).unwrap();
        fc.reset_stream(5, 70).unwrap();
        assert_eq!(fc.connection().highest_received(), 70);
        fc.reset_stream(5, 70).unwrap();
        assert_eq!(fc.connection().highest_received(), 70);
    }

    #[test]
    fn test_send_window_limited_by_connection() {
        let mut fc = manager();
        fc.new_stream(5, true);
        fc.new_stream(7, true);
        fc.update_window(5, 1000).unwrap();
        fc.update_window(7, 1000).unwrap();
        fc.add_bytes_sent(5, 120).unwrap();
        // connection window 150, 120 spent
        assert_eq!(fc.send_window_size(7).unwrap(), 30);
        assert!(fc.update_window(0, 500).unwrap());
        assert_eq!(fc.send_window_size(7).unwrap(), 380);
        assert_eq!(fc.send_window_size(0).unwrap(), 380);
    }

    #[test]
    fn test_update_window_stale_is_ignored() {
        let mut fc = manager();
        fc.new_stream(5, true);
        assert!(fc.update_window(5, 400).unwrap());
        assert!(!fc.update_window(5, 300).unwrap());
        assert_eq!(fc.controller(5).unwrap().send_window_offset(), 400);
        assert_eq!(
            fc.update_window(9, 400),
            Err(FlowControlError::UnknownStream(9))
        );
    }

    #[test]
    fn test_window_updates_collects_streams_and_connection() {
        let mut fc = manager();
        fc.new_stream(7, true);
        fc.new_stream(5, true);
        fc.new_stream(9, true);
        fc.add_bytes_read(7, 60).unwrap();
        fc.add_bytes_read(5, 60).unwrap();
        fc.add_bytes_read(9, 10).unwrap();

        // connection: 130 read of 150, remaining 20 < 75
        assert_eq!(
            fc.window_updates(),
            vec![
                WindowUpdate { stream_id: 5, offset: 160 },
                WindowUpdate { stream_id: 7, offset: 160 },
                WindowUpdate { stream_id: 0, offset: 280 },
            ]
        );
        assert!(fc.window_updates().is_empty());
        assert_eq!(fc.receive_window(0).unwrap(), 280);
        assert_eq!(fc.receive_window(5).unwrap(), 160);
    }
}
