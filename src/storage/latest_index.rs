//! Latest-Host Index
//!
//! Maintains the derived `latest_hosts` table: for every host name, a
//! pointer to the host row that was touched most recently. Per name the
//! pointer is a two-state machine, Absent <-> Pointing(host_id).
//!
//! The invariant, at all times: a pointer row exists iff at least one host
//! with that name exists, and it references the host with the maximum
//! `(updated, id)` among currently-existing hosts of that name. Ties on
//! `updated` break on `id`, both descending - most recently touched, and
//! among ties, most recently created.
//!
//! ## Linearization
//!
//! Notify/remove for the same name must never interleave, otherwise two
//! concurrent deletes can both compute a stale "next latest" and leave the
//! pointer dangling. Every compare-and-write here runs inside one SQLite
//! transaction that holds the write lock from its first statement (either
//! the first statement is a write, or the transaction begins IMMEDIATE), so
//! the single-writer lock plus the pool's busy timeout serializes them.

use crate::error::{Result, StoreError};
use crate::storage::models::{Host, LatestHost};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use tracing::{debug, error};

/// Maintainer of the latest-host pointer table
#[derive(Debug, Clone)]
pub struct LatestIndex {
    pool: SqlitePool,
}

impl LatestIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record that `host` was created or its `updated` timestamp changed
    ///
    /// Creates the pointer when the name is new; otherwise re-points it only
    /// if `host` is strictly more recent than the currently pointed host.
    pub async fn notify(&self, host: &Host) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            StoreError::database_error(format!("Failed to begin transaction: {}", e))
        })?;
        Self::notify_on(&mut tx, host).await?;
        tx.commit().await.map_err(|e| {
            StoreError::database_error(format!("Failed to commit transaction: {}", e))
        })
    }

    /// Record that `host` was deleted; re-derive or drop the pointer
    ///
    /// No-op when the pointer is absent or references a different host.
    pub async fn remove(&self, host: &Host) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            StoreError::database_error(format!("Failed to acquire connection: {}", e))
        })?;
        // Writer from the start: re-derivation reads the pointer before it
        // writes, and a deferred transaction upgrading after a read fails
        // with SQLITE_BUSY under contention instead of queuing on
        // busy_timeout.
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await.map_err(|e| {
            StoreError::database_error(format!("Failed to begin transaction: {}", e))
        })?;
        Self::remove_on(&mut tx, host.id, &host.name, None).await?;
        tx.commit().await.map_err(|e| {
            StoreError::database_error(format!("Failed to commit transaction: {}", e))
        })
    }

    /// Current pointer for a host name, if any
    pub async fn get(&self, name: &str) -> Result<Option<LatestHost>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT host_id FROM latest_hosts WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::database_error(format!("Failed to query latest host: {}", e))
                })?;

        Ok(row.map(|(host_id,)| LatestHost {
            name: name.to_string(),
            host_id,
        }))
    }

    /// Compare-and-write inside an existing transaction
    ///
    /// The first statement is a write, so the transaction owns the database
    /// write lock before any decision is made on what it read.
    pub(crate) async fn notify_on(conn: &mut SqliteConnection, host: &Host) -> Result<()> {
        let created =
            sqlx::query("INSERT OR IGNORE INTO latest_hosts (name, host_id) VALUES (?, ?)")
                .bind(&host.name)
                .bind(host.id)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    StoreError::database_error(format!("Failed to insert latest host: {}", e))
                })?
                .rows_affected();

        if created == 1 {
            debug!(name = %host.name, host_id = host.id, "Latest host pointer created");
            return Ok(());
        }

        let current_id: i64 =
            sqlx::query_as::<_, (i64,)>("SELECT host_id FROM latest_hosts WHERE name = ?")
                .bind(&host.name)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| {
                    StoreError::database_error(format!("Failed to fetch latest host: {}", e))
                })?
                .0;

        if current_id == host.id {
            // Pointer already references this host; its updated timestamp
            // moved with the row, nothing to re-point.
            return Ok(());
        }

        let current: Option<(i64, i64)> =
            sqlx::query_as("SELECT updated, id FROM hosts WHERE id = ?")
                .bind(current_id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    StoreError::database_error(format!("Failed to fetch pointed host: {}", e))
                })?;

        let Some((current_updated, current_host_id)) = current else {
            error!(
                name = %host.name,
                host_id = current_id,
                "Latest host pointer references a missing host row"
            );
            return Err(StoreError::InconsistentIndex(format!(
                "latest host '{}' references missing host {}",
                host.name, current_id
            )));
        };

        // Strictly greater on (updated, id) wins; anything else is a no-op
        if (host.updated, host.id) > (current_updated, current_host_id) {
            sqlx::query("UPDATE latest_hosts SET host_id = ? WHERE name = ?")
                .bind(host.id)
                .bind(&host.name)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    StoreError::database_error(format!("Failed to update latest host: {}", e))
                })?;
            debug!(
                name = %host.name,
                from = current_id,
                to = host.id,
                "Latest host pointer advanced"
            );
        }

        Ok(())
    }

    /// Pointer re-derivation inside an existing transaction
    ///
    /// `exclude_playbook` widens the exclusion from the single removed host
    /// to a whole playbook: during a playbook cascade, every sibling host of
    /// that playbook is about to be deleted too and must never be chosen as
    /// the new pointer target, not even transiently.
    pub(crate) async fn remove_on(
        conn: &mut SqliteConnection,
        host_id: i64,
        name: &str,
        exclude_playbook: Option<i64>,
    ) -> Result<()> {
        let current: Option<(i64,)> =
            sqlx::query_as("SELECT host_id FROM latest_hosts WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    StoreError::database_error(format!("Failed to query latest host: {}", e))
                })?;

        match current {
            None => return Ok(()),
            Some((current_id,)) if current_id != host_id => return Ok(()),
            Some(_) => {}
        }

        let next: Option<(i64,)> = match exclude_playbook {
            Some(playbook_id) => {
                sqlx::query_as(
                    r#"
                    SELECT id FROM hosts
                    WHERE name = ? AND id != ? AND playbook_id != ?
                    ORDER BY updated DESC, id DESC LIMIT 1
                    "#,
                )
                .bind(name)
                .bind(host_id)
                .bind(playbook_id)
                .fetch_optional(&mut *conn)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id FROM hosts
                    WHERE name = ? AND id != ?
                    ORDER BY updated DESC, id DESC LIMIT 1
                    "#,
                )
                .bind(name)
                .bind(host_id)
                .fetch_optional(&mut *conn)
                .await
            }
        }
        .map_err(|e| StoreError::database_error(format!("Failed to query next host: {}", e)))?;

        match next {
            Some((next_id,)) => {
                sqlx::query("UPDATE latest_hosts SET host_id = ? WHERE name = ?")
                    .bind(next_id)
                    .bind(name)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        StoreError::database_error(format!("Failed to update latest host: {}", e))
                    })?;
                debug!(name = %name, from = host_id, to = next_id, "Latest host pointer reassigned");
            }
            None => {
                sqlx::query("DELETE FROM latest_hosts WHERE name = ?")
                    .bind(name)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        StoreError::database_error(format!("Failed to delete latest host: {}", e))
                    })?;
                debug!(name = %name, "Latest host pointer removed (no hosts remain)");
            }
        }

        Ok(())
    }
}
