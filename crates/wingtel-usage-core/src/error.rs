//! Error types for wingtel usage.

use crate::ids::IdError;

/// Result type for wingtel usage operations.
pub type Result<T> = std::result::Result<T, UsageError>;

/// Errors that can occur while recording or querying usage.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    /// Malformed or missing input.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Name of the offending field or query parameter.
        field: &'static str,
        /// Human readable reason.
        message: String,
    },

    /// The rollup no longer matches the raw records it was derived from.
    ///
    /// Raised when a decrement targets a missing row or would drive a total
    /// below zero. Never clamped.
    #[error("aggregate integrity violation: {0}")]
    Integrity(String),

    /// Storage error reported by an aggregate table implementation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl UsageError {
    /// Shorthand for a [`UsageError::Validation`].
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}
