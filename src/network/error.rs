//! Connection engine error types.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use super::state::ConnectionState;

/// Errors that can occur in the connection engine.
///
/// Every error here is fatal to the connection it occurred on (the
/// connection settles in `Closed`) but never fatal to the process.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The configured remote address is missing or invalid.
    ///
    /// Surfaced immediately; no dial is attempted and no timeout elapses.
    #[error("remote address is missing or invalid")]
    InvalidRemoteAddress,

    /// A configuration value the engine cannot run with.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with the value.
        reason: String,
    },

    /// An outbound dial exceeded its deadline.
    #[error("connect to {address} timed out after {timeout:?}")]
    ConnectTimeout {
        /// The address that was being dialed.
        address: SocketAddr,
        /// The configured connect deadline.
        timeout: Duration,
    },

    /// The peer closed the stream.
    ///
    /// This includes a zero-byte read with no error, which the read loop
    /// deliberately maps to end-of-stream.
    #[error("end of stream")]
    EndOfStream,

    /// The outbound queue is full and the write would block.
    #[error("write queue is full")]
    WriteQueueFull,

    /// The operation requires an active transport and the connection has none.
    #[error("connection is not active (state: {state})")]
    NotActive {
        /// The state the connection was in.
        state: ConnectionState,
    },

    /// Any other transport-level read/write failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Whether this error was caused by a deadline elapsing.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            ConnectionError::ConnectTimeout { .. } => true,
            ConnectionError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Whether this error reports the peer ending the stream.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ConnectionError::EndOfStream)
    }
}

/// Result type for connection engine operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
