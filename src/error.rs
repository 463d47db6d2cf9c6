//! Error types for the Pollguard service.

use thiserror::Error;

/// Main error type for Pollguard operations.
///
/// The limiter itself never fails; these cover configuration, startup and
/// serving.
#[derive(Error, Debug)]
pub enum PollguardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for PollguardError {
    fn from(err: config::ConfigError) -> Self {
        PollguardError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for PollguardError {
    fn from(err: serde_yaml::Error) -> Self {
        PollguardError::Config(err.to_string())
    }
}

/// Result type alias for Pollguard operations.
pub type Result<T> = std::result::Result<T, PollguardError>;
