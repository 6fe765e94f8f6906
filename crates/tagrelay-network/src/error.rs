//! Transport error types.

use tagrelay_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur during transport operations.
///
/// Only [`NotConnected`](TransportError::NotConnected),
/// [`InvalidEndpoint`](TransportError::InvalidEndpoint) and
/// [`Closed`](TransportError::Closed) are ever returned to callers of the
/// client. Connection failures are logged and reported as a status change.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Payload sent while the client is not connected.
    #[error("Not connected to server")]
    NotConnected,

    /// Host or port rejected before any connection attempt.
    #[error("{0}")]
    InvalidEndpoint(#[from] tagrelay_core::Error),

    /// Handshake or name resolution failed.
    #[error("Connection to {endpoint} failed: {source}")]
    ConnectionFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection attempt timed out.
    #[error("Connection to {endpoint} timed out after {timeout_ms}ms")]
    ConnectionTimeout { endpoint: String, timeout_ms: u64 },

    /// Framing error on an established link.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The client task has stopped.
    #[error("Transport client is shut down")]
    Closed,
}
