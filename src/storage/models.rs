//! Row types shared across the storage components
//!
//! All types here are plain data: ids, hashes, byte counts and epoch-millis
//! timestamps. No sqlx or framework types leak out of this module's API.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};

/// Reference to a deduplicated, compressed file content blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub id: i64,
    /// SHA-1 of the decompressed plaintext, lowercase hex
    pub sha1: String,
}

/// A file recorded against a playbook run
///
/// Many files (across paths and playbooks) may reference the same content
/// blob; `(playbook_id, path)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub playbook_id: i64,
    pub path: String,
    pub content_sha1: String,
    pub created: i64,
    pub updated: i64,
}

/// A single execution of a playbook - the aggregate root that owns
/// hosts, files and records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: i64,
    pub path: String,
    pub status: PlaybookStatus,
    pub started: i64,
    pub ended: Option<i64>,
    pub created: i64,
    pub updated: i64,
}

/// Playbook run status
///
/// Closed enum with exhaustive wire-string conversion at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybookStatus {
    Unknown,
    Running,
    Completed,
    Failed,
}

impl PlaybookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybookStatus::Unknown => "unknown",
            PlaybookStatus::Running => "running",
            PlaybookStatus::Completed => "completed",
            PlaybookStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "unknown" => Ok(PlaybookStatus::Unknown),
            "running" => Ok(PlaybookStatus::Running),
            "completed" => Ok(PlaybookStatus::Completed),
            "failed" => Ok(PlaybookStatus::Failed),
            other => Err(StoreError::invalid_input(format!(
                "Unknown playbook status: {}",
                other
            ))),
        }
    }
}

/// Per-host result counters for one playbook run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStats {
    pub ok: i64,
    pub changed: i64,
    pub failed: i64,
    pub skipped: i64,
    pub unreachable: i64,
}

/// A host observed during one playbook run
///
/// The same host name recurs across playbooks (and may recur within one);
/// `name` is the group key of the latest-host index. [`HostStore::upsert`]
/// keys on `(name, playbook_id)`.
///
/// [`HostStore::upsert`]: crate::storage::HostStore::upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub name: String,
    pub playbook_id: i64,
    /// Decoded host facts (stored compressed)
    pub facts: serde_json::Value,
    pub stats: HostStats,
    pub created: i64,
    pub updated: i64,
}

/// Derived pointer from a host name to its most recently touched host row
///
/// Never written by collaborators; maintained exclusively by
/// [`LatestIndex`](crate::storage::LatestIndex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestHost {
    pub name: String,
    pub host_id: i64,
}

/// Value type tag for a key/value record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Text,
    List,
    Dict,
    Json,
    Url,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Text => "text",
            RecordKind::List => "list",
            RecordKind::Dict => "dict",
            RecordKind::Json => "json",
            RecordKind::Url => "url",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(RecordKind::Text),
            "list" => Ok(RecordKind::List),
            "dict" => Ok(RecordKind::Dict),
            "json" => Ok(RecordKind::Json),
            "url" => Ok(RecordKind::Url),
            other => Err(StoreError::invalid_input(format!(
                "Unknown record kind: {}",
                other
            ))),
        }
    }
}

/// A key/value record attached to a playbook run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub playbook_id: i64,
    pub key: String,
    pub kind: RecordKind,
    pub created: i64,
    pub updated: i64,
}
