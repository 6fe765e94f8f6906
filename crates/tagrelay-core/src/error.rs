use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid endpoint: {reason}")]
    InvalidEndpoint { reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    // Card errors
    #[error("Invalid card format: {0}")]
    InvalidCardFormat(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_endpoint(reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
