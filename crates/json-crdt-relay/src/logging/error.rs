//! Logging error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("Invalid log level: {0}")]
    InvalidLevel(String),
}
