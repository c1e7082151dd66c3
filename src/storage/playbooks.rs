//! Playbook Store
//!
//! Playbooks are the aggregate roots: every host, file and record belongs to
//! exactly one playbook run, and deleting a playbook cascades over all of
//! them (see [`Cascade`](crate::storage::Cascade)).

use crate::error::{Result, StoreError};
use crate::storage::models::{Playbook, PlaybookStatus};
use crate::storage::now_ms;
use sqlx::{Row, SqlitePool};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PlaybookStore {
    pool: SqlitePool,
}

impl PlaybookStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record the start of a playbook run
    pub async fn create(&self, path: &str, status: PlaybookStatus) -> Result<Playbook> {
        let now = now_ms();
        let id = sqlx::query(
            r#"
            INSERT INTO playbooks (path, status, started, created, updated)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(path)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database_error(format!("Failed to insert playbook: {}", e)))?
        .last_insert_rowid();

        debug!(id = id, path = %path, status = %status.as_str(), "Created playbook");
        self.get(id).await
    }

    /// Transition a playbook's status, marking `ended` for terminal states
    pub async fn update_status(&self, id: i64, status: PlaybookStatus) -> Result<Playbook> {
        let now = now_ms();
        let ended = match status {
            PlaybookStatus::Completed | PlaybookStatus::Failed => Some(now),
            PlaybookStatus::Unknown | PlaybookStatus::Running => None,
        };

        let updated = sqlx::query("UPDATE playbooks SET status = ?, ended = ?, updated = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(ended)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to update playbook: {}", e)))?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::not_found(format!("playbook {}", id)));
        }
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Playbook> {
        let row = sqlx::query("SELECT * FROM playbooks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to query playbook: {}", e)))?;

        match row {
            Some(row) => Ok(Playbook {
                id: row.get("id"),
                path: row.get("path"),
                status: PlaybookStatus::parse(row.get::<String, _>("status").as_str())?,
                started: row.get("started"),
                ended: row.get("ended"),
                created: row.get("created"),
                updated: row.get("updated"),
            }),
            None => Err(StoreError::not_found(format!("playbook {}", id))),
        }
    }
}
