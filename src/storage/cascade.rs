//! Cascade Deletion
//!
//! Deleting a playbook (or a single host) must leave the latest-host index
//! correct at every observable point. The ordering matters: pointer
//! re-derivation runs first, scoped to exclude everything that is about to
//! be deleted, and only then are the rows physically removed - all inside
//! one transaction. Relying on FK cascade semantics instead would let the
//! pointer transiently land on a sibling host that dies in the same cascade.

use crate::error::{Result, StoreError};
use crate::storage::latest_index::LatestIndex;
use crate::storage::models::Host;
use sqlx::{Connection, SqlitePool};
use tracing::info;

/// Orchestrates aggregate and entity deletion
#[derive(Debug, Clone)]
pub struct Cascade {
    pool: SqlitePool,
}

impl Cascade {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete a playbook run together with its hosts, files and records
    ///
    /// For every owned host the pointer re-derivation excludes the *whole*
    /// playbook, not just the host being processed, so a pointer is never
    /// reassigned to a sibling that the same cascade deletes a moment later.
    /// Content blobs are left untouched (no garbage collection).
    pub async fn delete_playbook(&self, playbook_id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            StoreError::database_error(format!("Failed to acquire connection: {}", e))
        })?;
        // Writer from the start: the cascade reads before it deletes, and a
        // deferred transaction upgrading after a read fails with SQLITE_BUSY
        // under contention instead of queuing on busy_timeout.
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await.map_err(|e| {
            StoreError::database_error(format!("Failed to begin transaction: {}", e))
        })?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM playbooks WHERE id = ?")
            .bind(playbook_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to query playbook: {}", e)))?;
        if exists.is_none() {
            return Err(StoreError::not_found(format!("playbook {}", playbook_id)));
        }

        let owned: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM hosts WHERE playbook_id = ?")
                .bind(playbook_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| StoreError::database_error(format!("Failed to query hosts: {}", e)))?;

        for (host_id, name) in &owned {
            LatestIndex::remove_on(&mut tx, *host_id, name, Some(playbook_id)).await?;
        }

        for table in ["hosts", "files", "records"] {
            sqlx::query(&format!("DELETE FROM {} WHERE playbook_id = ?", table))
                .bind(playbook_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    StoreError::database_error(format!("Failed to delete {}: {}", table, e))
                })?;
        }

        sqlx::query("DELETE FROM playbooks WHERE id = ?")
            .bind(playbook_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to delete playbook: {}", e)))?;

        tx.commit().await.map_err(|e| {
            StoreError::database_error(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            playbook_id = playbook_id,
            hosts = owned.len(),
            "Deleted playbook and owned rows"
        );
        Ok(())
    }

    /// Delete a single host, re-pointing the latest-host index first
    pub async fn delete_host(&self, host: &Host) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            StoreError::database_error(format!("Failed to acquire connection: {}", e))
        })?;
        // Writer from the start, same reasoning as delete_playbook.
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await.map_err(|e| {
            StoreError::database_error(format!("Failed to begin transaction: {}", e))
        })?;

        LatestIndex::remove_on(&mut tx, host.id, &host.name, None).await?;

        sqlx::query("DELETE FROM hosts WHERE id = ?")
            .bind(host.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to delete host: {}", e)))?;

        tx.commit().await.map_err(|e| {
            StoreError::database_error(format!("Failed to commit transaction: {}", e))
        })?;

        info!(host_id = host.id, name = %host.name, "Deleted host");
        Ok(())
    }
}
