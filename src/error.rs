//! Error types for treeland
//!
//! [`TreelandError`] covers failures inside the server itself and is
//! propagated with `?`. Errors caused by clients are posted on their
//! resources instead and never reach the server's control flow.

use std::fmt;

use crate::output::OutputId;

/// Main error type for treeland operations
#[derive(Debug, thiserror::Error)]
pub enum TreelandError {
    /// Listening socket or event loop setup failed
    #[error("Socket error: {0}")]
    Socket(String),

    /// Output not found
    #[error("Output {0} not found")]
    UnknownOutput(OutputId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed persisted json
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for treeland operations
pub type TreelandResult<T> = Result<T, TreelandError>;

/// Extension trait for Option to convert to Result with error context
pub trait OptionExt<T> {
    /// Convert None to an error with context
    fn ok_or_log<F>(self, error_fn: F) -> TreelandResult<T>
    where
        F: FnOnce() -> TreelandError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_log<F>(self, error_fn: F) -> TreelandResult<T>
    where
        F: FnOnce() -> TreelandError,
    {
        match self {
            Some(val) => Ok(val),
            None => {
                let err = error_fn();
                tracing::error!("{err}");
                Err(err)
            }
        }
    }
}

/// Helper for operations that should log errors but not propagate them
pub fn log_error<T, E: fmt::Display>(result: Result<T, E>) -> Option<T> {
    match result {
        Ok(val) => Some(val),
        Err(err) => {
            tracing::error!("Operation failed: {err}");
            None
        }
    }
}
