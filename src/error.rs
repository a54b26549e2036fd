//! Error types shared by every layer of the crate.
//!
//! Errors are never recovered locally: a failing foreign call aborts the
//! enclosing training or cross-validation loop and surfaces here.

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors returned by dataset, booster, training and cross-validation calls.
#[derive(Debug, Error)]
pub enum Error {
    /// The foreign engine returned a non-zero status.
    ///
    /// `message` is the engine's last-error text, read right after the
    /// failing call.
    #[error("engine error: {message}")]
    Engine { message: String },

    /// Malformed input shape (empty matrix, ragged rows, column mismatch).
    #[error("validation error: {0}")]
    Validation(String),

    /// An argument the engine cannot accept: whitespace in a parameter,
    /// an interior NUL, or a count beyond the engine's integer range.
    #[error("invalid argument {key:?}={value:?}: {reason}")]
    Argument {
        key: String,
        value: String,
        reason: &'static str,
    },

    /// A native handle was used after it was released.
    #[error("{0} handle used after release")]
    Resource(&'static str),

    /// A training or cross-validation configuration that cannot run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local I/O failure before the engine was called.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }

    pub(crate) fn argument(key: impl Into<String>, value: impl Into<String>, reason: &'static str) -> Self {
        Error::Argument {
            key: key.into(),
            value: value.into(),
            reason,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Result type for `lgbm` operations.
pub type Result<T> = std::result::Result<T, Error>;
