//! Record Registry
//!
//! Rudimentary key/value data attached to a playbook run, with values stored
//! as compressed JSON through the codec. `(playbook_id, key)` is unique;
//! re-upserting a key replaces its value and kind.

use crate::codec;
use crate::error::{Result, StoreError};
use crate::storage::models::{Record, RecordKind};
use crate::storage::now_ms;
use sqlx::{Row, SqlitePool};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RecordRegistry {
    pool: SqlitePool,
}

impl RecordRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create or replace the record at `(playbook_id, key)`
    pub async fn upsert(
        &self,
        playbook_id: i64,
        key: &str,
        kind: RecordKind,
        value: &serde_json::Value,
    ) -> Result<Record> {
        let blob = codec::encode(value)?;
        let now = now_ms();

        let mut tx = self.pool.begin().await.map_err(|e| {
            StoreError::database_error(format!("Failed to begin transaction: {}", e))
        })?;

        let updated = sqlx::query(
            "UPDATE records SET kind = ?, value = ?, updated = ? WHERE playbook_id = ? AND key = ?",
        )
        .bind(kind.as_str())
        .bind(&blob)
        .bind(now)
        .bind(playbook_id)
        .bind(key)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::database_error(format!("Failed to update record: {}", e)))?
        .rows_affected();

        if updated == 0 {
            sqlx::query(
                r#"
                INSERT INTO records (playbook_id, key, kind, value, created, updated)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(playbook_id)
            .bind(key)
            .bind(kind.as_str())
            .bind(&blob)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to insert record: {}", e)))?;
        }

        let row = sqlx::query("SELECT * FROM records WHERE playbook_id = ? AND key = ?")
            .bind(playbook_id)
            .bind(key)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to query record: {}", e)))?;
        let record = Self::row_to_record(row)?;

        tx.commit().await.map_err(|e| {
            StoreError::database_error(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            id = record.id,
            playbook_id = playbook_id,
            key = %key,
            kind = %kind.as_str(),
            replaced = updated > 0,
            "Upserted record"
        );

        Ok(record)
    }

    /// Fetch a record and its decoded value
    pub async fn get(&self, playbook_id: i64, key: &str) -> Result<(Record, serde_json::Value)> {
        let row = sqlx::query("SELECT * FROM records WHERE playbook_id = ? AND key = ?")
            .bind(playbook_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to query record: {}", e)))?;

        let Some(row) = row else {
            return Err(StoreError::not_found(format!(
                "record {} in playbook {}",
                key, playbook_id
            )));
        };

        let value = codec::decode(&row.get::<Vec<u8>, _>("value"))?;
        Ok((Self::row_to_record(row)?, value))
    }

    fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<Record> {
        Ok(Record {
            id: row.get("id"),
            playbook_id: row.get("playbook_id"),
            key: row.get("key"),
            kind: RecordKind::parse(row.get::<String, _>("kind").as_str())?,
            created: row.get("created"),
            updated: row.get("updated"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::PlaybookStatus;
    use crate::storage::{Database, PlaybookStore};
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (RecordRegistry, i64, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path()).await.unwrap();
        let playbook = PlaybookStore::new(db.pool())
            .create("/site.yml", PlaybookStatus::Running)
            .await
            .unwrap();
        (RecordRegistry::new(db.pool()), playbook.id, tmp)
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let (records, playbook_id, _tmp) = setup().await;

        let value = json!({"deploy_target": "staging", "retries": 3});
        let record = records
            .upsert(playbook_id, "deployment", RecordKind::Dict, &value)
            .await
            .unwrap();
        assert_eq!(record.kind, RecordKind::Dict);

        let (fetched, fetched_value) = records.get(playbook_id, "deployment").await.unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched_value, value);
    }

    #[tokio::test]
    async fn test_upsert_replaces_value_and_kind() {
        let (records, playbook_id, _tmp) = setup().await;

        records
            .upsert(playbook_id, "note", RecordKind::Text, &json!("first"))
            .await
            .unwrap();
        let replaced = records
            .upsert(playbook_id, "note", RecordKind::List, &json!(["a", "b"]))
            .await
            .unwrap();

        let (fetched, value) = records.get(playbook_id, "note").await.unwrap();
        assert_eq!(fetched.id, replaced.id);
        assert_eq!(fetched.kind, RecordKind::List);
        assert_eq!(value, json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (records, playbook_id, _tmp) = setup().await;
        let err = records.get(playbook_id, "absent").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
