//! Ordered collection membership.

use sqlx::SqliteConnection;

use crate::error::DatabaseError;
use crate::types::{CollectionId, ItemId};
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Members of a collection in collection order
    pub async fn list_collection_items(&self, collection: CollectionId) -> Result<Vec<ItemId>> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT item_id FROM collection_items
            WHERE collection_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(collection.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list collection items: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(ItemId).collect())
    }

    /// Append an item to a collection unless it is already a member
    pub async fn add_collection_item(&self, collection: CollectionId, item: &ItemId) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;
        Self::add_member_on(&mut conn, collection, item).await
    }

    /// Remove an item from a collection
    pub async fn remove_collection_item(
        &self,
        collection: CollectionId,
        item: &ItemId,
    ) -> Result<bool> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;
        Self::remove_member_on(&mut conn, collection, item).await
    }

    pub(super) async fn add_member_on(
        conn: &mut SqliteConnection,
        collection: CollectionId,
        item: &ItemId,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_items (collection_id, item_id, position)
            VALUES (
                ?, ?,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM collection_items WHERE collection_id = ?)
            )
            ON CONFLICT(collection_id, item_id) DO NOTHING
            "#,
        )
        .bind(collection.get())
        .bind(item.as_str())
        .bind(collection.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to add item {} to collection {}: {}",
                item, collection, e
            )))
        })?;

        Ok(())
    }

    pub(super) async fn remove_member_on(
        conn: &mut SqliteConnection,
        collection: CollectionId,
        item: &ItemId,
    ) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM collection_items WHERE collection_id = ? AND item_id = ?")
                .bind(collection.get())
                .bind(item.as_str())
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to remove item {} from collection {}: {}",
                        item, collection, e
                    )))
                })?;

        Ok(result.rows_affected() > 0)
    }
}
