//! Error types for wingtel usage storage.

use wingtel_usage_core::UsageError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A row lock could not be acquired before the lock timeout.
    #[error("lock contention: {0}")]
    Contention(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// Its identifier.
        id: String,
    },

    /// A record with this id already exists.
    #[error("duplicate record: {id}")]
    DuplicateRecord {
        /// The record ID that was duplicated.
        id: String,
    },

    /// Validation or aggregation failure; the transaction was rolled back.
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            rocksdb::ErrorKind::TimedOut | rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TryAgain => {
                Self::Contention(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<StoreError> for UsageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Usage(inner) => inner,
            other => Self::Storage(other.to_string()),
        }
    }
}
