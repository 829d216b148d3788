//! # Error Types
//!
//! Typed errors for the two library layers that can fail on their own: the
//! rendezvous barrier (only at construction) and the ping/pong transports.
//! Harness code above these layers (fixture, runner, binary) works with
//! `anyhow::Result` and converts these errors through `?`.

use crate::net::AppState;
use thiserror::Error;

/// Errors raised while constructing a [`Barrier`](crate::barrier::Barrier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BarrierError {
    /// A barrier needs at least one participant per round.
    #[error("barrier capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),
}

/// Errors raised by the socket transports and the pong applications.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed its end of the socket pair.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// An application received a message of the wrong size.
    #[error("unexpected data: expected {expected} bytes, got {actual}")]
    UnexpectedData { expected: usize, actual: usize },

    /// An application callback fired while the application was in the wrong state.
    #[error("{operation} called while the application is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: AppState,
    },

    #[error("frame of {len} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// A single send/recv call moved fewer bytes than the buffer holds.
    #[error("short {operation}: expected {expected} bytes, transferred {actual}")]
    ShortTransfer {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] bincode::Error),
}

/// Convenience alias used throughout the transport layer.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
