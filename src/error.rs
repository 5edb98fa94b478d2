//! Error types for the Floodgate service.

use thiserror::Error;

/// Main error type for Floodgate operations.
///
/// Admission decisions themselves never fail; these errors come from
/// configuration loading and from running the HTTP server.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for FloodgateError {
    fn from(err: config::ConfigError) -> Self {
        FloodgateError::Config(err.to_string())
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
