//! Integration tests across the storage components
//!
//! Exercises the end-to-end consistency contracts: latest-pointer
//! reassignment through deletes and cascades, and deduplication seen through
//! the file registry rather than the content store alone.

use crate::error::StoreError;
use crate::storage::models::{HostStats, PlaybookStatus};
use crate::storage::now_ms;
use crate::storage::{
    Cascade, ContentStore, Database, FileRegistry, Host, HostStore, LatestIndex, PlaybookStore,
};
use serde_json::json;
use tempfile::TempDir;

struct World {
    db: Database,
    playbooks: PlaybookStore,
    hosts: HostStore,
    files: FileRegistry,
    contents: ContentStore,
    index: LatestIndex,
    cascade: Cascade,
    // Timestamps forced by host_at sit above this, an hour past the wall
    // clock, so the upsert's own wall-clock notify can never outrank them.
    base: i64,
    _tmp: TempDir,
}

async fn world() -> World {
    let tmp = TempDir::new().unwrap();
    let db = Database::open(tmp.path()).await.unwrap();
    World {
        playbooks: PlaybookStore::new(db.pool()),
        hosts: HostStore::new(db.pool()),
        files: FileRegistry::new(db.pool()),
        contents: ContentStore::new(db.pool()),
        index: LatestIndex::new(db.pool()),
        cascade: Cascade::new(db.pool()),
        base: now_ms() + 3_600_000,
        db,
        _tmp: tmp,
    }
}

impl World {
    async fn playbook(&self) -> i64 {
        self.playbooks
            .create("/site.yml", PlaybookStatus::Running)
            .await
            .unwrap()
            .id
    }

    /// Upsert a host and force `updated = base + offset_ms`
    ///
    /// The forced timestamps lie above the wall clock, so the pointer moves
    /// exactly as the offsets dictate: notify never re-points backwards, and
    /// a rewrite below an already-notified timestamp would be ignored.
    async fn host_at(&self, playbook_id: i64, name: &str, offset_ms: i64) -> Host {
        let host = self
            .hosts
            .upsert(playbook_id, name, &json!({}), HostStats::default())
            .await
            .unwrap();
        sqlx::query("UPDATE hosts SET updated = ? WHERE id = ?")
            .bind(self.base + offset_ms)
            .bind(host.id)
            .execute(&self.db.pool())
            .await
            .unwrap();
        let host = self.hosts.get(host.id).await.unwrap();
        self.index.notify(&host).await.unwrap();
        host
    }

    async fn pointer(&self, name: &str) -> Option<i64> {
        self.index.get(name).await.unwrap().map(|p| p.host_id)
    }

    async fn count(&self, sql: &str) -> i64 {
        sqlx::query_as::<_, (i64,)>(sql)
            .fetch_one(&self.db.pool())
            .await
            .unwrap()
            .0
    }
}

#[tokio::test]
async fn test_reassignment_on_delete() {
    let w = world().await;
    let p1 = w.playbook().await;
    let p2 = w.playbook().await;

    // A at t1 under P1, B at t2 > t1 under P2
    let a = w.host_at(p1, "web1", 1_000).await;
    assert_eq!(w.pointer("web1").await, Some(a.id));

    let b = w.host_at(p2, "web1", 2_000).await;
    assert_eq!(w.pointer("web1").await, Some(b.id));

    w.cascade.delete_host(&b).await.unwrap();
    assert_eq!(w.pointer("web1").await, Some(a.id));

    w.cascade.delete_host(&a).await.unwrap();
    assert_eq!(w.pointer("web1").await, None);
}

#[tokio::test]
async fn test_delete_non_latest_leaves_pointer_alone() {
    let w = world().await;
    let p1 = w.playbook().await;
    let p2 = w.playbook().await;

    let a = w.host_at(p1, "web1", 1_000).await;
    let b = w.host_at(p2, "web1", 2_000).await;

    w.cascade.delete_host(&a).await.unwrap();
    assert_eq!(w.pointer("web1").await, Some(b.id));
}

#[tokio::test]
async fn test_cascade_excludes_siblings() {
    let w = world().await;
    let p1 = w.playbook().await;

    // Hosts A and B share the name "web1" and both belong to P1. The
    // collaborator writes B directly and notifies the index, as the API
    // layer does.
    w.host_at(p1, "web1", 1_000).await;
    let b_id = sqlx::query(
        "INSERT INTO hosts (name, playbook_id, facts, created, updated) VALUES (?, ?, ?, ?, ?)",
    )
    .bind("web1")
    .bind(p1)
    .bind(crate::codec::encode(&json!({})).unwrap())
    .bind(w.base + 2_000)
    .bind(w.base + 2_000)
    .execute(&w.db.pool())
    .await
    .unwrap()
    .last_insert_rowid();
    let b = w.hosts.get(b_id).await.unwrap();
    w.index.notify(&b).await.unwrap();
    assert_eq!(w.pointer("web1").await, Some(b.id));

    w.cascade.delete_playbook(p1).await.unwrap();

    // Pointer ends Absent, never reassigned from B to the dying sibling A
    assert_eq!(w.pointer("web1").await, None);
    assert_eq!(w.count("SELECT COUNT(*) FROM latest_hosts").await, 0);
}

#[tokio::test]
async fn test_cascade_repoints_to_surviving_playbook() {
    let w = world().await;
    let p1 = w.playbook().await;
    let p2 = w.playbook().await;

    let survivor = w.host_at(p1, "web1", 1_000).await;
    let latest = w.host_at(p2, "web1", 2_000).await;
    assert_eq!(w.pointer("web1").await, Some(latest.id));

    // Deleting the playbook that owns the latest host re-points to the
    // survivor in the other playbook
    w.cascade.delete_playbook(p2).await.unwrap();
    assert_eq!(w.pointer("web1").await, Some(survivor.id));
    assert_eq!(w.count("SELECT COUNT(*) FROM hosts").await, 1);
}

#[tokio::test]
async fn test_latest_pointer_invariant_across_mixed_operations() {
    let w = world().await;
    let p1 = w.playbook().await;
    let p2 = w.playbook().await;
    let p3 = w.playbook().await;

    let h1 = w.host_at(p1, "web1", 1_000).await;
    let h2 = w.host_at(p2, "web1", 3_000).await;
    let h3 = w.host_at(p3, "web1", 2_000).await;

    // Invariant: pointer = argmax(updated, id) among existing hosts
    assert_eq!(w.pointer("web1").await, Some(h2.id));

    w.cascade.delete_host(&h2).await.unwrap();
    assert_eq!(w.pointer("web1").await, Some(h3.id));

    w.cascade.delete_playbook(p3).await.unwrap();
    assert_eq!(w.pointer("web1").await, Some(h1.id));

    w.cascade.delete_playbook(p1).await.unwrap();
    assert_eq!(w.pointer("web1").await, None);
}

#[tokio::test]
async fn test_dedup_survives_playbook_deletion() {
    let w = world().await;
    let p1 = w.playbook().await;
    let p2 = w.playbook().await;

    w.files.upsert(p1, "/play.yml", b"shared").await.unwrap();
    w.files.upsert(p2, "/play.yml", b"shared").await.unwrap();
    assert_eq!(w.count("SELECT COUNT(*) FROM file_contents").await, 1);
    assert_eq!(w.count("SELECT COUNT(*) FROM files").await, 2);

    w.cascade.delete_playbook(p1).await.unwrap();

    // The surviving file still resolves through the shared blob
    let file = w.files.get(p2, "/play.yml").await.unwrap();
    let plaintext = w.contents.get(&file.content_sha1).await.unwrap();
    assert_eq!(plaintext, b"shared");
    assert_eq!(w.count("SELECT COUNT(*) FROM file_contents").await, 1);
}

#[tokio::test]
async fn test_deleted_playbook_files_are_gone_but_blobs_remain() {
    let w = world().await;
    let p1 = w.playbook().await;

    let file = w.files.upsert(p1, "/play.yml", b"only here").await.unwrap();
    w.cascade.delete_playbook(p1).await.unwrap();

    assert!(matches!(
        w.files.get_by_id(file.id).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
    // No garbage collection: the blob outlives every reference
    let orphan = w.contents.get(&file.content_sha1).await.unwrap();
    assert_eq!(orphan, b"only here");
}

#[tokio::test]
async fn test_concurrent_host_upserts_keep_pointer_consistent() {
    let w = world().await;

    // Sixteen playbooks racing to upsert the same host name; afterwards the
    // pointer must reference the argmax(updated, id) among surviving rows.
    let mut handles = Vec::new();
    for _ in 0..16 {
        let playbooks = w.playbooks.clone();
        let hosts = w.hosts.clone();
        handles.push(tokio::spawn(async move {
            let playbook = playbooks
                .create("/site.yml", PlaybookStatus::Running)
                .await
                .unwrap();
            hosts
                .upsert(playbook.id, "web1", &json!({}), HostStats::default())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let expected: (i64,) = sqlx::query_as(
        "SELECT id FROM hosts WHERE name = 'web1' ORDER BY updated DESC, id DESC LIMIT 1",
    )
    .fetch_one(&w.db.pool())
    .await
    .unwrap();
    assert_eq!(w.pointer("web1").await, Some(expected.0));
}
