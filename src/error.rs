//! Error types for podcast-dl
//!
//! This module provides error handling for the library:
//! - A top-level [`Error`] with conversions from every layer
//! - [`DatabaseError`] for SQLite failures with context
//! - [`ValidationError`] raised by record stores when a batch is rejected
//! - [`TransferError`] describing why a network transfer failed

use crate::types::{ItemId, TransferStatus};
use thiserror::Error;

/// Result type alias for podcast-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for podcast-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_transfers")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A batch of records was rejected before being written
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Network transfer error
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Resume token could not be decoded
    #[error("invalid resume token: {0}")]
    InvalidResumeToken(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new commands
    #[error("shutdown in progress: not accepting new commands")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be mapped back to a record
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Reasons a record store rejects a batch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Progress must be a fraction between 0.0 and 1.0
    #[error("item {item}: progress {progress} is outside 0.0..=1.0")]
    ProgressOutOfRange {
        /// Item the record belongs to
        item: ItemId,
        /// Offending progress value
        progress: f32,
    },

    /// Resume data is only kept for canceled transfers
    #[error("item {item}: resume token present with status {status}")]
    ResumeTokenWithoutCancel {
        /// Item the record belongs to
        item: ItemId,
        /// Status the record carried
        status: TransferStatus,
    },

    /// A succeeded record must say where the file is and when it landed
    #[error("item {item}: succeeded record is missing {field}")]
    IncompleteSuccess {
        /// Item the record belongs to
        item: ItemId,
        /// Name of the missing field
        field: &'static str,
    },

    /// The same item was written twice in one batch
    #[error("item {item} appears more than once in the batch")]
    DuplicateItem {
        /// Item that was repeated
        item: ItemId,
    },

    /// Item ids must not be empty
    #[error("record has an empty item id")]
    EmptyItemId,
}

/// Why a network transfer failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransferError {
    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Connection or body stream failure
    #[error("network failure: {0}")]
    Network(String),

    /// Partial or final file could not be written
    #[error("storage failure: {0}")]
    Storage(String),

    /// Server sent a range that does not continue the partial file
    #[error("server resumed at byte {got}, expected {expected}")]
    RangeMismatch {
        /// Offset the partial file ends at
        expected: u64,
        /// Offset the server started from
        got: u64,
    },
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        TransferError::Network(e.to_string())
    }
}
