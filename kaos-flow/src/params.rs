//! Negotiated window sizes.
//!
//! The receive side is local configuration. The send side starts from a
//! conservative default and is replaced once the peer's transport
//! parameters arrive during the handshake.

use crate::error::{FlowControlError, Result};
use kaos_shared::{ByteCount, Scope, KIB};
use parking_lot::RwLock;

/// Default initial stream receive window (16KB)
pub const DEFAULT_STREAM_RECEIVE_WINDOW: ByteCount = 16 * KIB;
/// Default initial connection receive window (1.5x the stream window)
pub const DEFAULT_CONNECTION_RECEIVE_WINDOW: ByteCount = DEFAULT_STREAM_RECEIVE_WINDOW * 3 / 2;
/// Ceiling the stream window increment may auto-tune up to (1MB)
pub const DEFAULT_MAX_STREAM_RECEIVE_WINDOW: ByteCount = 1024 * KIB;
/// Ceiling the connection window increment may auto-tune up to (1.5MB)
pub const DEFAULT_MAX_CONNECTION_RECEIVE_WINDOW: ByteCount =
    DEFAULT_MAX_STREAM_RECEIVE_WINDOW * 3 / 2;
/// Send window assumed until the peer advertises its own (16KB)
pub const DEFAULT_INITIAL_SEND_WINDOW: ByteCount = 16 * KIB;

/// Read-only view of negotiated window sizes, per scope.
pub trait ParametersSource: Send + Sync {
    /// Initial receive window, also the initial window increment.
    fn initial_window(&self, scope: Scope) -> ByteCount;

    /// Ceiling for the auto-tuned receive window increment.
    fn max_window_increment(&self, scope: Scope) -> ByteCount;

    /// Send window granted by the peer before any window update.
    fn initial_send_window(&self, scope: Scope) -> ByteCount;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    pub stream_receive_window: ByteCount,
    pub connection_receive_window: ByteCount,
    pub max_stream_receive_window: ByteCount,
    pub max_connection_receive_window: ByteCount,
    pub stream_send_window: ByteCount,
    pub connection_send_window: ByteCount,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            stream_receive_window: DEFAULT_STREAM_RECEIVE_WINDOW,
            connection_receive_window: DEFAULT_CONNECTION_RECEIVE_WINDOW,
            max_stream_receive_window: DEFAULT_MAX_STREAM_RECEIVE_WINDOW,
            max_connection_receive_window: DEFAULT_MAX_CONNECTION_RECEIVE_WINDOW,
            stream_send_window: DEFAULT_INITIAL_SEND_WINDOW,
            connection_send_window: DEFAULT_INITIAL_SEND_WINDOW,
        }
    }
}

impl FlowConfig {
    /// Small round numbers for tests.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            stream_receive_window: 100,
            connection_receive_window: 150,
            max_stream_receive_window: 1000,
            max_connection_receive_window: 1500,
            stream_send_window: 100,
            connection_send_window: 150,
        }
    }

    pub fn receive_window(&self, scope: Scope) -> ByteCount {
        match scope {
            Scope::Connection => self.connection_receive_window,
            Scope::Stream => self.stream_receive_window,
        }
    }

    pub fn max_receive_window(&self, scope: Scope) -> ByteCount {
        match scope {
            Scope::Connection => self.max_connection_receive_window,
            Scope::Stream => self.max_stream_receive_window,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for scope in [Scope::Stream, Scope::Connection] {
            let initial = self.receive_window(scope);
            let max = self.max_receive_window(scope);
            if initial == 0 {
                return Err(FlowControlError::invalid_config(format!(
                    "{:?} receive window must be non-zero",
                    scope
                )));
            }
            if initial > max {
                return Err(FlowControlError::invalid_config(format!(
                    "{:?} receive window {} exceeds maximum {}",
                    scope, initial, max
                )));
            }
        }
        Ok(())
    }
}

/// Send windows advertised by the peer.
#[derive(Debug, Clone, Copy)]
struct PeerWindows {
    stream: ByteCount,
    connection: ByteCount,
}

/// Per-connection [`ParametersSource`].
///
/// Shared by every controller of one connection. The handshake writes the
/// peer's send windows once; everything else only reads.
#[derive(Debug)]
pub struct ConnectionParameters {
    config: FlowConfig,
    peer: RwLock<PeerWindows>,
}

impl ConnectionParameters {
    pub fn new(config: FlowConfig) -> Result<Self> {
        config.validate()?;
        let peer = PeerWindows {
            stream: config.stream_send_window,
            connection: config.connection_send_window,
        };
        Ok(Self {
            config,
            peer: RwLock::new(peer),
        })
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Apply the send windows from the peer's transport parameters.
    pub fn set_peer_send_windows(&self, stream: ByteCount, connection: ByteCount) {
        let mut peer = self.peer.write();
        peer.stream = stream;
        peer.connection = connection;
    }
}

impl ParametersSource for ConnectionParameters {
    fn initial_window(&self, scope: Scope) -> ByteCount {
        self.config.receive_window(scope)
    }

    fn max_window_increment(&self, scope: Scope) -> ByteCount {
        self.config.max_receive_window(scope)
    }

    fn initial_send_window(&self, scope: Scope) -> ByteCount {
        let peer = self.peer.read();
        match scope {
            Scope::Connection => peer.connection,
            Scope::Stream => peer.stream,
        }
    }
}
