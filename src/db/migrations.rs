//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::Database;

/// One schema statement and what it creates, for error messages
type Step = (&'static str, &'static str);

/// Schema v1: records, ordered collection membership, runtime state
const V1: &[Step] = &[
    (
        "transfer_records table",
        r#"
        CREATE TABLE transfer_records (
            item_id TEXT PRIMARY KEY,
            transfer_id TEXT NOT NULL UNIQUE,
            source_url TEXT NOT NULL,
            status INTEGER NOT NULL,
            progress REAL NOT NULL DEFAULT 0.0,
            resume_token BLOB,
            downloaded_at INTEGER,
            size_bytes INTEGER,
            storage_path TEXT,
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "transfer_records status index",
        "CREATE INDEX idx_transfer_records_status ON transfer_records(status)",
    ),
    (
        "collection_items table",
        r#"
        CREATE TABLE collection_items (
            collection_id INTEGER NOT NULL,
            item_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (collection_id, item_id)
        )
        "#,
    ),
    (
        "collection_items order index",
        "CREATE INDEX idx_collection_items_order ON collection_items(collection_id, position)",
    ),
    (
        "runtime_state table",
        r#"
        CREATE TABLE IF NOT EXISTS runtime_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
    // A brand-new database has nothing to recover
    (
        "clean shutdown marker",
        r#"
        INSERT INTO runtime_state (key, value, updated_at)
        VALUES ('clean_shutdown', 'true', CAST(strftime('%s', 'now') AS INTEGER))
        "#,
    ),
];

/// Every schema version in order
const MIGRATIONS: &[(i64, &[Step])] = &[(1, V1)];

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file (and its parent directory) if it doesn't
    /// exist and brings the schema up to date.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;

        tracing::debug!(path = %path.display(), "Database opened");
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current = self.schema_version().await?;
        for (version, steps) in MIGRATIONS {
            if *version > current {
                self.apply_migration(*version, steps).await?;
            }
        }
        Ok(())
    }

    /// Apply one version in a single transaction; a failed step rolls back the rest
    async fn apply_migration(&self, version: i64, steps: &[Step]) -> Result<()> {
        tracing::info!(version, "Applying database migration");

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to begin migration v{}: {}",
                version, e
            )))
        })?;

        for (what, sql) in steps {
            sqlx::query(sql).execute(&mut *tx).await.map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "v{}: failed to create {}: {}",
                    version, what, e
                )))
            })?;
        }

        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration v{}: {}",
                    version, e
                )))
            })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to commit migration v{}: {}",
                version, e
            )))
        })?;

        tracing::info!(version, "Database migration complete");
        Ok(())
    }

    /// Current schema version (0 before any migration)
    pub async fn schema_version(&self) -> Result<i64> {
        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to query schema version: {}",
                    e
                )))
            })?;

        Ok(version.unwrap_or(0))
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
