//! Core error types and utilities

use thiserror::Error;

/// Errors produced while spawning and supervising child processes
///
/// The type is `Clone` so that a single failed outcome can be handed to
/// every waiter of a [`Command`](crate::process::Command) result; I/O errors
/// are therefore carried as text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("Spawn error: {0}")]
    Spawn(String),

    #[error("No async runtime: {0}")]
    NoRuntime(String),

    #[error("Supervision error: {0}")]
    Supervision(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Generic error: {0}")]
    Other(String),
}

impl ExecError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::Spawn(_) => "TETHER001",
            ExecError::NoRuntime(_) => "TETHER002",
            ExecError::Supervision(_) => "TETHER003",
            ExecError::InvalidSignal(_) => "TETHER004",
            ExecError::ConfigurationError(_) => "TETHER005",
            ExecError::ValidationError(_) => "TETHER006",
            ExecError::IoError(_) => "TETHER007",
            ExecError::Other(_) => "TETHER999",
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, ExecError>;

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::IoError(e.to_string())
    }
}

impl From<&str> for ExecError {
    fn from(s: &str) -> Self {
        ExecError::Other(s.to_string())
    }
}

impl From<String> for ExecError {
    fn from(s: String) -> Self {
        ExecError::Other(s)
    }
}
