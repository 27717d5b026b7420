//! Error types for kaos-flow.

use kaos_shared::{ByteCount, StreamId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowControlError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowControlError {
    /// A stream frame ended below the highest offset already seen.
    /// Expected under reordering; only fatal once the stream is reset.
    #[error("received a smaller byte offset")]
    ReceivedSmallerOffset,

    #[error(
        "flow control violation on stream {stream_id}: received up to {highest_received}, window is {receive_window}"
    )]
    FlowControlViolation {
        stream_id: StreamId,
        highest_received: ByteCount,
        receive_window: ByteCount,
    },

    #[error("data after termination on stream {stream_id}")]
    DataAfterTermination { stream_id: StreamId },

    #[error("unknown stream {0}")]
    UnknownStream(StreamId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FlowControlError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FlowControlViolation { .. } | Self::DataAfterTermination { .. }
        )
    }
}
