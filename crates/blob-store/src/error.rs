//! Storage error types

use thiserror::Error;

/// Errors produced by [`ObjectStore`](crate::ObjectStore) implementations.
///
/// Callers rely on the distinction between missing objects, transient
/// backend failures, and permission problems: missing objects are often
/// recoverable (skip with a warning), transient failures are retried, and
/// permission failures are surfaced immediately.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object exists under the requested key
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The backend failed in a way that may succeed on retry
    #[error("Transient storage failure: {reason}")]
    Transient { reason: String },

    /// The backend is throttling the caller
    #[error("Rate limited by storage backend: {reason}")]
    RateLimited { reason: String },

    /// The caller is not allowed to perform this operation
    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    /// The key cannot be used with this backend
    #[error("Invalid object key: {key}")]
    InvalidKey { key: String },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the failed call can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Transient { .. } | StoreError::RateLimited { .. }
        )
    }

    /// Whether this error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
