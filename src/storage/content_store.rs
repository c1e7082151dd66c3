//! Deduplicating Content Store
//!
//! Stores file contents exactly once, keyed by the SHA-1 of the decompressed
//! plaintext. Any number of file rows (across paths and playbooks) may
//! reference one blob. Blobs are immutable once created and are never
//! deleted - there is no garbage collection, an unreferenced blob simply
//! stays around (dedup semantics rely on blob immortality).
//!
//! ## Concurrency
//!
//! Two callers may race to insert the same new hash. The insert is guarded
//! by the UNIQUE constraint on `sha1` using `INSERT OR IGNORE` followed by a
//! re-read of the winning row, so the operation is idempotent under races:
//! after N concurrent calls with identical plaintext exactly one blob row
//! exists and every caller gets the same reference. Writes for *different*
//! hashes never serialize against each other beyond SQLite's write lock.

use crate::codec;
use crate::error::{Result, StoreError};
use crate::storage::models::ContentRef;
use crate::storage::now_ms;
use sha1::{Digest, Sha1};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

/// Deduplicating blob store keyed by content hash
#[derive(Debug, Clone)]
pub struct ContentStore {
    pool: SqlitePool,
}

impl ContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Compute the SHA-1 content hash of plaintext bytes
    ///
    /// Pure function; lowercase hex. This is the identity exposed to
    /// callers and always matches what a client computes independently.
    pub fn hash(plaintext: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(plaintext);
        format!("{:x}", hasher.finalize())
    }

    /// Resolve or create the blob for `plaintext`
    ///
    /// Returns the existing blob unchanged when the hash is already known;
    /// otherwise compresses the plaintext and inserts a new row.
    pub async fn get_or_create(&self, plaintext: &[u8]) -> Result<ContentRef> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            StoreError::database_error(format!("Failed to acquire connection: {}", e))
        })?;
        Self::get_or_create_on(&mut conn, plaintext).await
    }

    /// Transaction-composable variant of [`get_or_create`](Self::get_or_create)
    ///
    /// Used by the file registry so blob resolution and the file row write
    /// commit or roll back as one unit.
    pub(crate) async fn get_or_create_on(
        conn: &mut SqliteConnection,
        plaintext: &[u8],
    ) -> Result<ContentRef> {
        let sha1 = Self::hash(plaintext);

        // Fast path: content already stored, skip compression entirely
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM file_contents WHERE sha1 = ?")
                .bind(&sha1)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    StoreError::database_error(format!("Failed to query file content: {}", e))
                })?;

        if let Some((id,)) = existing {
            debug!(id = id, sha1 = %sha1, "Content already stored (deduplicated)");
            return Ok(ContentRef { id, sha1 });
        }

        let compressed = codec::compress(plaintext)?;

        // INSERT OR IGNORE + re-read resolves the race on the UNIQUE(sha1)
        // constraint: the loser discards its insert and adopts the winner.
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO file_contents (sha1, contents, created) VALUES (?, ?, ?)",
        )
        .bind(&sha1)
        .bind(&compressed)
        .bind(now_ms())
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::database_error(format!("Failed to insert file content: {}", e)))?
        .rows_affected();

        let id: i64 = sqlx::query_as::<_, (i64,)>("SELECT id FROM file_contents WHERE sha1 = ?")
            .bind(&sha1)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                StoreError::database_error(format!("Failed to fetch file content id: {}", e))
            })?
            .0;

        if inserted == 0 {
            debug!(id = id, sha1 = %sha1, "Lost insert race, adopted existing content row");
        } else {
            debug!(
                id = id,
                sha1 = %sha1,
                size = plaintext.len(),
                compressed = compressed.len(),
                "Stored new file content"
            );
        }

        Ok(ContentRef { id, sha1 })
    }

    /// Fetch and decompress the plaintext for a content hash
    ///
    /// # Errors
    ///
    /// - `NotFound` if no blob with that hash exists
    /// - `CorruptBlob` if the stored payload fails to decompress
    pub async fn get(&self, sha1: &str) -> Result<Vec<u8>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT contents FROM file_contents WHERE sha1 = ?")
                .bind(sha1)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::database_error(format!("Failed to query file content: {}", e))
                })?;

        match row {
            Some((compressed,)) => codec::decompress(&compressed),
            None => Err(StoreError::not_found(format!("file content {}", sha1))),
        }
    }
}
