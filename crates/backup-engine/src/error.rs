//! Backup engine error types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the backup engine.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The database dump tool failed
    #[error("Database dump failed: {reason}")]
    Dump { reason: String },

    /// The database restore tool failed
    #[error("Database restore failed: {reason}")]
    RestoreMechanism { reason: String },

    /// Compressing or decompressing an artifact failed
    #[error("Compression error: {source}")]
    Compression {
        #[source]
        source: std::io::Error,
    },

    /// An artifact does not match its recorded digest or size
    #[error("Integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Another backup or restore holds the database lease
    #[error("Operation already in progress: lease held by {owner} until {expires_at}")]
    OperationInProgress {
        owner: String,
        expires_at: DateTime<Utc>,
    },

    /// The requested snapshot id is not in the listed set
    #[error("Invalid snapshot selection: {id}")]
    InvalidSelection { id: String },

    /// A snapshot expected to exist is gone
    #[error("Snapshot not found: {id}")]
    SnapshotMissing { id: String },

    /// A destructive step was reached without its confirmation gate
    #[error("Confirmation required before replacing the live database")]
    ConfirmationRequired,

    /// A restore step was invoked out of order
    #[error("Invalid restore phase: expected {expected}, currently {actual}")]
    InvalidPhase { expected: String, actual: String },

    /// Missing or invalid configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Storage adapter failure
    #[error("Storage error: {0}")]
    Storage(#[from] blob_store::StoreError),

    /// I/O failure outside the storage adapters
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Backup engine result type.
pub type BackupResult<T> = Result<T, BackupError>;
