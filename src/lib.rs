//! runstore - storage core for recording automation run data
//!
//! Stores playbook run data (hosts, files, key/value records) in SQLite with
//! two consistency-critical pieces:
//!
//! - a deduplicating content store: file contents are compressed and stored
//!   exactly once, keyed by the SHA-1 of the decompressed plaintext;
//! - a derived latest-host index: per host name, a pointer to the
//!   most-recently-touched host row, re-derived correctly under concurrent
//!   writers and cascading deletes.
//!
//! The HTTP/CLI layers consume this crate through plain-data operations
//! (ids, hashes, byte slices, timestamps); no sqlx types cross the boundary.
//!
//! ```no_run
//! use runstore::storage::{Database, FileRegistry, PlaybookStore, PlaybookStatus};
//!
//! # async fn demo() -> runstore::Result<()> {
//! let db = Database::open(std::path::Path::new("./data")).await?;
//! let playbooks = PlaybookStore::new(db.pool());
//! let files = FileRegistry::new(db.pool());
//!
//! let playbook = playbooks.create("/site.yml", PlaybookStatus::Running).await?;
//! files.upsert(playbook.id, "/site.yml", b"- hosts: all\n").await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod storage;

pub use error::{Result, StoreError};
