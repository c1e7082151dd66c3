//! File Registry
//!
//! Maps `(playbook_id, path)` to a content blob through the content store.
//! Path uniqueness is per playbook; re-upserting an existing path swaps the
//! referenced blob (the previous blob stays, unreferenced or not - there is
//! no garbage collection).
//!
//! File rows are never deleted here; they go away when the owning playbook
//! is removed by the cascade.

use crate::error::{Result, StoreError};
use crate::storage::content_store::ContentStore;
use crate::storage::models::File;
use crate::storage::now_ms;
use sqlx::{Connection, Row, SqliteConnection, SqlitePool};
use tracing::debug;

/// Registry of files recorded against playbook runs
#[derive(Debug, Clone)]
pub struct FileRegistry {
    pool: SqlitePool,
}

impl FileRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create or update the file at `(playbook_id, path)` with new content
    ///
    /// Blob resolution and the file row write happen in one transaction, so
    /// a file row never references a blob that was not committed.
    pub async fn upsert(&self, playbook_id: i64, path: &str, plaintext: &[u8]) -> Result<File> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            StoreError::database_error(format!("Failed to acquire connection: {}", e))
        })?;
        // Writer from the start: this transaction reads before it writes, and
        // a deferred transaction that upgrades after a read fails with
        // SQLITE_BUSY under contention instead of queuing on busy_timeout.
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await.map_err(|e| {
            StoreError::database_error(format!("Failed to begin transaction: {}", e))
        })?;

        let content = ContentStore::get_or_create_on(&mut tx, plaintext).await?;
        let now = now_ms();

        let updated = sqlx::query(
            "UPDATE files SET content_sha1 = ?, updated = ? WHERE playbook_id = ? AND path = ?",
        )
        .bind(&content.sha1)
        .bind(now)
        .bind(playbook_id)
        .bind(path)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::database_error(format!("Failed to update file: {}", e)))?
        .rows_affected();

        if updated == 0 {
            sqlx::query(
                r#"
                INSERT INTO files (playbook_id, path, content_sha1, created, updated)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(playbook_id)
            .bind(path)
            .bind(&content.sha1)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to insert file: {}", e)))?;
        }

        let file = Self::fetch_on(&mut tx, playbook_id, path).await?;

        tx.commit().await.map_err(|e| {
            StoreError::database_error(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            id = file.id,
            playbook_id = playbook_id,
            path = %path,
            sha1 = %content.sha1,
            replaced = updated > 0,
            "Upserted file"
        );

        Ok(file)
    }

    /// Look up a file by its owning playbook and path
    pub async fn get(&self, playbook_id: i64, path: &str) -> Result<File> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            StoreError::database_error(format!("Failed to acquire connection: {}", e))
        })?;
        Self::fetch_on(&mut conn, playbook_id, path).await
    }

    /// Look up a file by id
    pub async fn get_by_id(&self, id: i64) -> Result<File> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to query file: {}", e)))?;

        row.map(Self::row_to_file)
            .ok_or_else(|| StoreError::not_found(format!("file {}", id)))
    }

    async fn fetch_on(conn: &mut SqliteConnection, playbook_id: i64, path: &str) -> Result<File> {
        let row = sqlx::query("SELECT * FROM files WHERE playbook_id = ? AND path = ?")
            .bind(playbook_id)
            .bind(path)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to query file: {}", e)))?;

        row.map(Self::row_to_file)
            .ok_or_else(|| StoreError::not_found(format!("file {} in playbook {}", path, playbook_id)))
    }

    fn row_to_file(row: sqlx::sqlite::SqliteRow) -> File {
        File {
            id: row.get("id"),
            playbook_id: row.get("playbook_id"),
            path: row.get("path"),
            content_sha1: row.get("content_sha1"),
            created: row.get("created"),
            updated: row.get("updated"),
        }
    }
}
