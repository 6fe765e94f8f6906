//! Error types for framing and payload encoding.

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while framing or encoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame exceeds the configured maximum size.
    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    /// Frame payload is not valid UTF-8.
    #[error("Invalid UTF-8 in frame: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Outbound payload contains a framing byte.
    #[error("Payload contains reserved byte 0x{byte:02X} at offset {offset}")]
    ReservedByte { byte: u8, offset: usize },

    /// Payload could not be serialized or parsed.
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Low-level I/O error from the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
