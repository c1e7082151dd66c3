//! Storage Core
//!
//! Records execution data from automation runs and serves it back to the
//! query layer. Two things in here carry real invariants, everything else is
//! plumbing around them:
//!
//! - **Content store**: file contents are deduplicated by the SHA-1 of their
//!   decompressed plaintext; any number of file rows share one blob and
//!   blobs are never deleted.
//! - **Latest-host index**: for every host name, a derived pointer to the
//!   most-recently-touched host row, kept correct across upserts, single
//!   deletes and whole-playbook cascades.
//!
//! ## Data flow
//!
//! ```text
//! raw bytes -> codec (zlib) -> ContentStore.get_or_create -> FileRegistry row
//! host upsert -> LatestIndex.notify      (same transaction)
//! host/playbook delete -> Cascade -> LatestIndex re-derivation, then row deletes
//! ```
//!
//! Every component takes the pool explicitly; the only shared mutable state
//! is the database itself.

pub mod cascade;
pub mod content_store;
pub mod db;
pub mod file_registry;
pub mod hosts;
pub mod latest_index;
pub mod models;
pub mod playbooks;
pub mod records;

#[cfg(test)]
mod integration_tests;

pub use cascade::Cascade;
pub use content_store::ContentStore;
pub use db::Database;
pub use file_registry::FileRegistry;
pub use hosts::HostStore;
pub use latest_index::LatestIndex;
pub use models::{
    ContentRef, File, Host, HostStats, LatestHost, Playbook, PlaybookStatus, Record, RecordKind,
};
pub use playbooks::PlaybookStore;
pub use records::RecordRegistry;

/// Current time as epoch milliseconds, the timestamp unit of every table
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
