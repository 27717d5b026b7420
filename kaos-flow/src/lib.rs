//! # kaos-flow
//!
//! Stream and connection flow control for multiplexed Kaos transports.
//!
//! ## Features
//!
//! - **Two levels**: one controller per stream plus one for the connection
//! - **Auto-tuning**: the receive window increment doubles (up to a ceiling)
//!   while window updates arrive faster than every two smoothed RTTs
//! - **Safe accounting**: monotonic offsets, no double counting, no underflow
//! - **Deterministic**: time comes from an injectable [`Clock`](kaos_shared::Clock)
//!
//! ## Usage
//!
//! ```rust
//! use kaos_flow::{ConnectionParameters, FlowConfig, FlowController, RttStats};
//! use kaos_shared::SystemClock;
//! use std::sync::Arc;
//!
//! let config = FlowConfig {
//!     stream_receive_window: 100,
//!     max_stream_receive_window: 1000,
//!     ..FlowConfig::default()
//! };
//! let params = Arc::new(ConnectionParameters::new(config).unwrap());
//! let rtt = Arc::new(RttStats::new());
//!
//! let mut stream = FlowController::new(5, params, rtt, Arc::new(SystemClock));
//! stream.add_bytes_read(60);
//! assert_eq!(stream.maybe_update_window(), Some(160));
//! ```
//!
//! ## Protocol
//!
//! - The peer may send up to `receive_window`; exceeding it is a violation
//! - A window update is announced once less than half an increment remains
//! - This endpoint may send up to the peer's latest window update offset

// Tracing macros - no-op when feature disabled
#[cfg(feature = "tracing")]
macro_rules! trace_debug { ($($arg:tt)*) => { tracing::debug!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug { ($($arg:tt)*) => {} }

#[cfg(feature = "tracing")]
macro_rules! trace_warn { ($($arg:tt)*) => { tracing::warn!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn { ($($arg:tt)*) => {} }

pub mod controller;
pub mod error;
pub mod manager;
pub mod params;
pub mod rtt;

pub use controller::FlowController;
pub use error::{FlowControlError, Result};
pub use manager::{FlowControlManager, WindowUpdate};
pub use params::{ConnectionParameters, FlowConfig, ParametersSource};
pub use rtt::{RttEstimator, RttStats};
