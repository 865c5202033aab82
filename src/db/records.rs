//! Transfer record CRUD and transactional batches.

use sqlx::SqliteConnection;

use crate::error::DatabaseError;
use crate::store::ChangeSet;
use crate::types::{ItemId, TransferId, TransferRecord, TransferStatus};
use crate::{Error, Result};

use super::{Database, TransferRecordRow};

const SELECT_RECORD: &str = r#"
    SELECT
        item_id, transfer_id, source_url, status, progress, resume_token,
        downloaded_at, size_bytes, storage_path, updated_at
    FROM transfer_records
"#;

impl Database {
    /// Get the record whose last transfer handle is `transfer_id`
    pub async fn get_record_by_transfer(
        &self,
        transfer_id: TransferId,
    ) -> Result<Option<TransferRecord>> {
        let row = sqlx::query_as::<_, TransferRecordRow>(&format!(
            "{SELECT_RECORD} WHERE transfer_id = ?"
        ))
        .bind(transfer_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get record by transfer: {}",
                e
            )))
        })?;

        row.map(TransferRecord::try_from).transpose()
    }

    /// Get the record of an item
    pub async fn get_record_for_item(&self, item: &ItemId) -> Result<Option<TransferRecord>> {
        let row = sqlx::query_as::<_, TransferRecordRow>(&format!(
            "{SELECT_RECORD} WHERE item_id = ?"
        ))
        .bind(item.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get record for item: {}",
                e
            )))
        })?;

        row.map(TransferRecord::try_from).transpose()
    }

    /// List records with a specific status, oldest write first
    pub async fn list_records_by_status(
        &self,
        status: TransferStatus,
    ) -> Result<Vec<TransferRecord>> {
        let rows = sqlx::query_as::<_, TransferRecordRow>(&format!(
            "{SELECT_RECORD} WHERE status = ? ORDER BY updated_at ASC"
        ))
        .bind(status.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list records by status: {}",
                e
            )))
        })?;

        rows.into_iter().map(TransferRecord::try_from).collect()
    }

    /// Insert or replace a single record
    pub async fn upsert_record(&self, record: &TransferRecord) -> Result<()> {
        record.validate()?;
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;
        Self::upsert_record_on(&mut conn, record).await
    }

    /// Delete the record of an item
    pub async fn delete_record(&self, item: &ItemId) -> Result<bool> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;
        Self::delete_record_on(&mut conn, item).await
    }

    /// Apply a batch of record and membership changes in one transaction
    ///
    /// The batch is validated first; a [`ValidationError`](crate::ValidationError)
    /// rejects it without touching the database. Evictions run before
    /// memberships, and records are written last.
    pub async fn apply_changes(&self, changes: &ChangeSet) -> Result<()> {
        changes.validate()?;
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        for (collection, item) in &changes.evictions {
            Self::remove_member_on(&mut tx, *collection, item).await?;
            Self::delete_record_on(&mut tx, item).await?;
        }
        for (collection, item) in &changes.memberships {
            Self::add_member_on(&mut tx, *collection, item).await?;
        }
        for record in &changes.records {
            Self::upsert_record_on(&mut tx, record).await?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit changes: {}",
                e
            )))
        })?;

        Ok(())
    }

    pub(super) async fn upsert_record_on(
        conn: &mut SqliteConnection,
        record: &TransferRecord,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let storage_path = record
            .storage_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        sqlx::query(
            r#"
            INSERT INTO transfer_records (
                item_id, transfer_id, source_url, status, progress, resume_token,
                downloaded_at, size_bytes, storage_path, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(item_id) DO UPDATE SET
                transfer_id = excluded.transfer_id,
                source_url = excluded.source_url,
                status = excluded.status,
                progress = excluded.progress,
                resume_token = excluded.resume_token,
                downloaded_at = excluded.downloaded_at,
                size_bytes = excluded.size_bytes,
                storage_path = excluded.storage_path,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.item_id.as_str())
        .bind(record.transfer_id.to_string())
        .bind(record.source_url.as_str())
        .bind(record.status.to_i32())
        .bind(record.progress)
        .bind(record.resume_token.as_ref().map(|t| t.as_bytes().to_vec()))
        .bind(record.downloaded_at.map(|t| t.timestamp_millis()))
        .bind(record.size_bytes.map(|b| b as i64))
        .bind(storage_path)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert record for item {}: {}",
                record.item_id, e
            )))
        })?;

        Ok(())
    }

    async fn delete_record_on(conn: &mut SqliteConnection, item: &ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM transfer_records WHERE item_id = ?")
            .bind(item.as_str())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete record: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
