//! Flow control scope discriminator.

use crate::{StreamId, CONNECTION_STREAM_ID};

/// Which traffic a flow controller accounts for.
///
/// - `Connection`: aggregate of every contributing stream
/// - `Stream`: a single stream's absolute offsets
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Connection-wide accounting (stream id 0)
    Connection = 0,
    /// Per-stream accounting
    Stream = 1,
}

impl Scope {
    /// Scope addressed by a stream id.
    #[inline]
    pub fn of(stream_id: StreamId) -> Self {
        if stream_id == CONNECTION_STREAM_ID {
            Self::Connection
        } else {
            Self::Stream
        }
    }

    #[inline]
    pub fn is_connection(self) -> bool {
        self == Self::Connection
    }
}
