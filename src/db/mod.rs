//! Database layer for podcast-dl
//!
//! Handles SQLite persistence for transfer records and collection membership.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`records`] - Transfer record CRUD and transactional batches
//! - [`collections`] - Ordered collection membership
//! - [`state`] - Runtime state (shutdown tracking)

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::error::{DatabaseError, Error};
use crate::types::{ItemId, ResumeToken, TransferId, TransferRecord, TransferStatus};

mod collections;
mod migrations;
mod records;
mod state;

/// Transfer record as stored in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct TransferRecordRow {
    /// Item the record belongs to
    pub item_id: String,
    /// Last transfer handle (UUID text)
    pub transfer_id: String,
    /// Source URL
    pub source_url: String,
    /// Status code (see [`TransferStatus::to_i32`])
    pub status: i32,
    /// Fraction downloaded (0.0-1.0)
    pub progress: f32,
    /// Opaque resume blob
    pub resume_token: Option<Vec<u8>>,
    /// Unix timestamp (milliseconds) when the file landed
    pub downloaded_at: Option<i64>,
    /// Stored file size in bytes
    pub size_bytes: Option<i64>,
    /// Stored file path
    pub storage_path: Option<String>,
    /// Unix timestamp of the last write
    pub updated_at: i64,
}

impl TryFrom<TransferRecordRow> for TransferRecord {
    type Error = Error;

    fn try_from(row: TransferRecordRow) -> Result<Self, Self::Error> {
        let transfer_id = TransferId::from_str(&row.transfer_id).map_err(|e| {
            Error::Database(DatabaseError::CorruptRow(format!(
                "item {} has invalid transfer id '{}': {}",
                row.item_id, row.transfer_id, e
            )))
        })?;
        let source_url = Url::parse(&row.source_url).map_err(|e| {
            Error::Database(DatabaseError::CorruptRow(format!(
                "item {} has invalid source url '{}': {}",
                row.item_id, row.source_url, e
            )))
        })?;

        Ok(TransferRecord {
            item_id: ItemId(row.item_id),
            transfer_id,
            source_url,
            status: TransferStatus::from_i32(row.status),
            progress: row.progress,
            resume_token: row.resume_token.map(ResumeToken::new),
            downloaded_at: row.downloaded_at.and_then(millis_to_datetime),
            size_bytes: row.size_bytes.map(|b| b.max(0) as u64),
            storage_path: row.storage_path.map(PathBuf::from),
        })
    }
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Database handle for podcast-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
