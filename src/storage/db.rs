//! SQLite Database Handle
//!
//! Owns the connection pool and the schema. Every storage component takes an
//! explicit [`Database`] (or its pool) in its constructor - there is no
//! process-wide client singleton, which keeps the components trivially
//! testable in isolation.
//!
//! ## Schema
//!
//! - `playbooks`: aggregate roots, one row per playbook run
//! - `file_contents`: deduplicated, zlib-compressed blobs keyed by SHA-1
//! - `files`: `(playbook_id, path)` -> content blob
//! - `hosts`: hosts observed per playbook run, upserted by `(name, playbook_id)`
//! - `latest_hosts`: derived pointer, host name -> most recent host row
//! - `records`: key/value data per playbook run, `(playbook_id, key)` unique

use crate::error::{Result, StoreError};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Shared database handle
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database under `data_dir` and initialize the schema
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created, the database cannot
    /// be opened, or schema initialization fails.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
            StoreError::database_error(format!("Failed to create data directory: {}", e))
        })?;

        let db_path = data_dir.join("runstore.db");
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

        info!(path = %db_path.display(), "Opening run store database");

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(&db_url)
            .await
            .map_err(|e| {
                StoreError::database_error(format!("Failed to connect to database: {}", e))
            })?;

        // WAL keeps readers unblocked while the single writer commits
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await
            .map_err(|e| {
                StoreError::database_error(format!("Failed to set synchronous mode: {}", e))
            })?;

        // Writers queue on the database write lock instead of failing fast.
        // This is what linearizes concurrent latest-pointer maintenance.
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await
            .map_err(|e| {
                StoreError::database_error(format!("Failed to set busy timeout: {}", e))
            })?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// Access the underlying pool (components clone this into their constructors)
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Initialize database schema
    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS playbooks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                status TEXT NOT NULL,
                started INTEGER NOT NULL,
                ended INTEGER,
                created INTEGER NOT NULL,
                updated INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| {
            StoreError::database_error(format!("Failed to create playbooks table: {}", e))
        })?;

        // Blobs are immutable and never deleted; sha1 is computed over the
        // decompressed plaintext so identity is independent of compression.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_contents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sha1 TEXT NOT NULL UNIQUE,
                contents BLOB NOT NULL,
                created INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| {
            StoreError::database_error(format!("Failed to create file_contents table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                playbook_id INTEGER NOT NULL,
                path TEXT NOT NULL,
                content_sha1 TEXT NOT NULL,
                created INTEGER NOT NULL,
                updated INTEGER NOT NULL,
                UNIQUE (playbook_id, path),
                FOREIGN KEY (playbook_id) REFERENCES playbooks(id)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| StoreError::database_error(format!("Failed to create files table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                playbook_id INTEGER NOT NULL,
                facts BLOB NOT NULL,
                ok INTEGER NOT NULL DEFAULT 0,
                changed INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                unreachable INTEGER NOT NULL DEFAULT 0,
                created INTEGER NOT NULL,
                updated INTEGER NOT NULL,
                FOREIGN KEY (playbook_id) REFERENCES playbooks(id)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| StoreError::database_error(format!("Failed to create hosts table: {}", e)))?;

        // Derived index: one row per host name, pointing at the host row with
        // the maximum (updated, id). Only the LatestIndex component writes it.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS latest_hosts (
                name TEXT PRIMARY KEY,
                host_id INTEGER NOT NULL,
                FOREIGN KEY (host_id) REFERENCES hosts(id)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| {
            StoreError::database_error(format!("Failed to create latest_hosts table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                playbook_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                kind TEXT NOT NULL,
                value BLOB NOT NULL,
                created INTEGER NOT NULL,
                updated INTEGER NOT NULL,
                UNIQUE (playbook_id, key),
                FOREIGN KEY (playbook_id) REFERENCES playbooks(id)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| {
            StoreError::database_error(format!("Failed to create records table: {}", e))
        })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_playbook ON files(playbook_id)")
            .execute(pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to create index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_hosts_playbook ON hosts(playbook_id)")
            .execute(pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to create index: {}", e)))?;

        // Supports the "next latest" re-derivation query on host deletion
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_hosts_name_updated ON hosts(name, updated DESC, id DESC)",
        )
        .execute(pool)
        .await
        .map_err(|e| StoreError::database_error(format!("Failed to create index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_playbook ON records(playbook_id)")
            .execute(pool)
            .await
            .map_err(|e| StoreError::database_error(format!("Failed to create index: {}", e)))?;

        info!("Database schema initialized successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path()).await.unwrap();

        // Schema init is idempotent, opening twice must not fail
        let db2 = Database::open(temp_dir.path()).await.unwrap();
        drop(db2);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM file_contents")
            .fetch_one(&db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}
