//! Error types for reader hardware and card decoding.
//!
//! Two families live here. [`HardwareError`] covers failures talking to the
//! reader or to a tag's memory. [`DecodeError`] is the outcome of a tag that
//! could not be turned into a card record; the session absorbs it and the
//! tag is dropped.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Failures talking to a reader or to the memory of a tag in its field.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The reader, or the controller it feeds, is gone.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// The reader or the card cannot perform the request.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// An exchange with the reader or the tag failed.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// The reader answered with something unusable.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// The reader service could not be reached.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }
}

/// Reasons a raw tag could not be decoded into a card record.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The tag exposes none of the decodable technologies.
    #[error("Unsupported tag technologies: [{technologies}]")]
    UnsupportedTechnology { technologies: String },

    /// The serial or memory could not be read (timeout, tag lost, corruption).
    #[error("Tag unreadable: {reason}")]
    Unreadable { reason: String },

    /// No key from the well-known list authenticated the sector.
    #[error("No valid key for sector {sector}")]
    NoValidKey { sector: u8 },

    /// The extracted identifier is not a valid card number.
    #[error("Invalid card number: {0}")]
    InvalidCardNumber(#[from] tagrelay_core::Error),
}

impl DecodeError {
    /// Create a new unreadable error.
    pub fn unreadable(reason: impl Into<String>) -> Self {
        Self::Unreadable {
            reason: reason.into(),
        }
    }
}

impl From<HardwareError> for DecodeError {
    fn from(error: HardwareError) -> Self {
        Self::unreadable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("ACR122U");
        assert!(matches!(error, HardwareError::Disconnected { .. }));
        assert_eq!(error.to_string(), "Device disconnected: ACR122U");
    }

    #[test]
    fn test_unsupported_error() {
        let error = HardwareError::unsupported("load key");
        assert_eq!(error.to_string(), "Unsupported operation: load key");
    }

    #[test]
    fn test_hardware_error_becomes_unreadable() {
        let error = DecodeError::from(HardwareError::communication("tag lost"));
        assert!(matches!(error, DecodeError::Unreadable { .. }));
        assert_eq!(
            error.to_string(),
            "Tag unreadable: Communication error: tag lost"
        );
    }

    #[test]
    fn test_no_valid_key_display() {
        assert_eq!(
            DecodeError::NoValidKey { sector: 0 }.to_string(),
            "No valid key for sector 0"
        );
    }
}
