//! # kaos-shared
//!
//! Shared transport types for Kaos flow control.
//!
//! This crate provides the small vocabulary used by both the flow control
//! core and the transport that drives it:
//!
//! - [`ByteCount`] / [`StreamId`]: byte offsets and stream identifiers
//! - [`Scope`]: connection-level vs stream-level accounting
//! - [`Clock`]: injectable time source
//!
//! ## Layer Diagram
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ kaos-flow (Flow Control)                │
//! │ - FlowController, FlowControlManager    │
//! └────────────────────┬────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────┐
//! │ kaos-shared (Transport Types)           │
//! │ - ByteCount, StreamId, Scope, Clock     │  ← This crate
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kaos_shared::{Scope, CONNECTION_STREAM_ID};
//!
//! assert_eq!(Scope::of(CONNECTION_STREAM_ID), Scope::Connection);
//! assert_eq!(Scope::of(5), Scope::Stream);
//! ```

mod clock;
mod scope;

pub use clock::{Clock, SystemClock};
pub use scope::Scope;

/// Byte count or absolute byte offset within a stream or connection.
pub type ByteCount = u64;

/// Stream identifier. `0` is reserved for the connection itself.
pub type StreamId = u32;

/// Stream id that addresses the connection-level scope.
pub const CONNECTION_STREAM_ID: StreamId = 0;

/// Number of bytes in a KiB, used when reporting window sizes.
pub const KIB: ByteCount = 1 << 10;
