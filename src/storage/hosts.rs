//! Host Store
//!
//! Hosts are the tracked entities of the latest-host index, carrying
//! compressed facts and result counters. Upserts key on `(name, playbook)`.
//! Upserts bump `updated` and drive [`LatestIndex::notify`] inside the same
//! transaction, so the pointer can never observe a half-written host.

use crate::codec;
use crate::error::{Result, StoreError};
use crate::storage::latest_index::LatestIndex;
use crate::storage::models::{Host, HostStats};
use crate::storage::now_ms;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

/// Store for hosts observed during playbook runs
#[derive(Debug, Clone)]
pub struct HostStore {
    pool: SqlitePool,
}

impl HostStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create or refresh the host `(name, playbook_id)` and update the
    /// latest-host pointer
    pub async fn upsert(
        &self,
        playbook_id: i64,
        name: &str,
        facts: &serde_json::Value,
        stats: HostStats,
    ) -> Result<Host> {
        let facts_blob = codec::encode(facts)?;
        let now = now_ms();

        let mut tx = self.pool.begin().await.map_err(|e| {
            StoreError::database_error(format!("Failed to begin transaction: {}", e))
        })?;

        let updated = sqlx::query(
            r#"
            UPDATE hosts
            SET facts = ?, ok = ?, changed = ?, failed = ?, skipped = ?, unreachable = ?, updated = ?
            WHERE playbook_id = ? AND name = ?
            "#,
        )
        .bind(&facts_blob)
        .bind(stats.ok)
        .bind(stats.changed)
        .bind(stats.failed)
        .bind(stats.skipped)
        .bind(stats.unreachable)
        .bind(now)
        .bind(playbook_id)
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::database_error(format!("Failed to update host: {}", e)))?
        .rows_affected();

        if updated == 0 {
            sqlx::query(
                r#"
                INSERT INTO hosts (name, playbook_id, facts, ok, changed, failed, skipped, unreachable, created, updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(name)
            .bind(playbook_id)
            .bind(&facts_blob)
            .bind(stats.ok)
            .bind(stats.changed)
            .bind(stats.failed)
            .bind(stats.skipped)
            .bind(stats.unreachable)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to insert host: {}", e)))?;
        }

        let host = Self::fetch_on(&mut tx, playbook_id, name).await?;

        // Same transaction: host write and pointer maintenance are one unit
        LatestIndex::notify_on(&mut tx, &host).await?;

        tx.commit().await.map_err(|e| {
            StoreError::database_error(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            id = host.id,
            name = %name,
            playbook_id = playbook_id,
            refreshed = updated > 0,
            "Upserted host"
        );

        Ok(host)
    }

    /// Look up a host by id
    pub async fn get(&self, id: i64) -> Result<Host> {
        let row = sqlx::query("SELECT * FROM hosts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to query host: {}", e)))?;

        match row {
            Some(row) => Self::row_to_host(row),
            None => Err(StoreError::not_found(format!("host {}", id))),
        }
    }

    /// All hosts recorded for one playbook run
    pub async fn list_by_playbook(&self, playbook_id: i64) -> Result<Vec<Host>> {
        let rows = sqlx::query("SELECT * FROM hosts WHERE playbook_id = ? ORDER BY id")
            .bind(playbook_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to query hosts: {}", e)))?;

        rows.into_iter().map(Self::row_to_host).collect()
    }

    async fn fetch_on(conn: &mut SqliteConnection, playbook_id: i64, name: &str) -> Result<Host> {
        let row = sqlx::query("SELECT * FROM hosts WHERE playbook_id = ? AND name = ?")
            .bind(playbook_id)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to query host: {}", e)))?;

        match row {
            Some(row) => Self::row_to_host(row),
            None => Err(StoreError::not_found(format!(
                "host {} in playbook {}",
                name, playbook_id
            ))),
        }
    }

    fn row_to_host(row: sqlx::sqlite::SqliteRow) -> Result<Host> {
        let facts_blob: Vec<u8> = row.get("facts");
        Ok(Host {
            id: row.get("id"),
            name: row.get("name"),
            playbook_id: row.get("playbook_id"),
            facts: codec::decode(&facts_blob)?,
            stats: HostStats {
                ok: row.get("ok"),
                changed: row.get("changed"),
                failed: row.get("failed"),
                skipped: row.get("skipped"),
                unreachable: row.get("unreachable"),
            },
            created: row.get("created"),
            updated: row.get("updated"),
        })
    }
}
