use std::{sync::Arc, time::Duration};

use cdolog::{
    commit::{CdoSnapshot, Commit},
    graph::global_id::GlobalId,
    log::{CdoError, CdoLog},
    metadata::registry::{EntityDefinition, PropertyDecl, TypeRef, TypeRegistry},
    object::{Instance, ObjectHeap, Value},
    persist::{Repository, RepositoryResult, SnapshotQuery, memory::InMemoryRepository},
    runtime::{
        events::AuditEvent,
        handle::{RuntimeConfig, RuntimeError, spawn_auditor},
    },
    shadow::{ShadowScope, VersionSelector},
    types::{CommitId, SnapshotKind},
};

fn log() -> CdoLog {
    CdoLog::builder()
        .with_types(TypeRegistry::new().entity(
            EntityDefinition::new("Person")
                .property(PropertyDecl::new("id", TypeRef::int()).id())
                .property(PropertyDecl::new("name", TypeRef::string())),
        ))
        .build()
        .expect("build log")
}

fn heap_with(name: &str) -> (ObjectHeap, cdolog::object::ObjRef) {
    let mut heap = ObjectHeap::new();
    let root = heap.alloc(Instance::new("Person").with("id", 1_i64).with("name", name));
    (heap, root)
}

#[tokio::test]
async fn runtime_commit_shadow_delete_and_events_ordered() {
    let handle = spawn_auditor(log(), RuntimeConfig::default());
    let mut sub = handle.subscribe();
    let id = GlobalId::instance("Person", 1_i64);

    let (heap, root) = heap_with("Ann");
    let first = handle.commit("alice", heap, vec![root]).await.expect("commit");
    let (heap, root) = heap_with("Ann");
    let unchanged = handle.commit("alice", heap, vec![root]).await.expect("no-op");
    assert!(unchanged.is_empty());
    let (heap, root) = heap_with("Anna");
    let second = handle.commit("bob", heap, vec![root]).await.expect("commit");

    let shadow = handle
        .shadow(id.clone(), VersionSelector::AtCommit(first.id()), ShadowScope::Deep)
        .await
        .expect("shadow");
    assert_eq!(
        shadow.root_instance().and_then(|p| p.get("name")),
        Some(&Value::text("Ann"))
    );

    let deleted = handle.shallow_delete("carol", id.clone()).await.expect("delete");
    let history = handle
        .snapshots_of(id.clone(), SnapshotQuery::all())
        .await
        .expect("history");
    let kinds: Vec<SnapshotKind> = history.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![SnapshotKind::Terminal, SnapshotKind::Update, SnapshotKind::Initial]
    );

    let mut seen = Vec::new();
    for _ in 0..3 {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event")
            .expect("recv");
        seen.push(evt);
    }
    assert_eq!(
        seen,
        vec![
            AuditEvent::Committed {
                commit_id: first.id(),
                author: "alice".to_string(),
                snapshots: 1,
            },
            AuditEvent::Committed {
                commit_id: second.id(),
                author: "bob".to_string(),
                snapshots: 1,
            },
            AuditEvent::Deleted {
                global_id: id.clone(),
                commit_id: deleted.id(),
            },
        ]
    );

    let again = handle.shallow_delete("carol", id).await;
    assert!(matches!(again, Err(RuntimeError::Log(CdoError::NotFound(_)))));

    handle.shutdown().await.expect("shutdown");
    let (heap, root) = heap_with("Late");
    assert!(matches!(
        handle.commit("alice", heap, vec![root]).await,
        Err(RuntimeError::ChannelClosed)
    ));
}

#[tokio::test]
async fn clones_share_one_writer() {
    let handle = spawn_auditor(log(), RuntimeConfig::default());
    let mut tasks = Vec::new();
    for i in 0..8_i64 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let mut heap = ObjectHeap::new();
            let root = heap.alloc(
                Instance::new("Person")
                    .with("id", i)
                    .with("name", format!("P{i}")),
            );
            handle.commit("worker", heap, vec![root]).await
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.expect("join").expect("commit").id());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);

    handle.shutdown().await.expect("shutdown");
}

/// Reads from memory; every write panics.
#[derive(Default)]
struct PanickingWrites {
    inner: InMemoryRepository,
}

impl Repository for PanickingWrites {
    fn ensure_schema(&self) -> RepositoryResult<()> {
        self.inner.ensure_schema()
    }

    fn snapshots_of(
        &self,
        id: &GlobalId,
        query: &SnapshotQuery,
    ) -> RepositoryResult<Vec<CdoSnapshot>> {
        self.inner.snapshots_of(id, query)
    }

    fn persist(&self, commit: &Commit) -> RepositoryResult<()> {
        panic!("write of commit {} failed", commit.id())
    }

    fn head_id(&self) -> RepositoryResult<Option<CommitId>> {
        self.inner.head_id()
    }

    fn last_sequence(&self) -> RepositoryResult<u64> {
        self.inner.last_sequence()
    }

    fn commit_metadata(
        &self,
        id: CommitId,
    ) -> RepositoryResult<Option<cdolog::commit::CommitMetadata>> {
        self.inner.commit_metadata(id)
    }
}

#[tokio::test]
async fn panicking_storage_task_is_reported_and_loop_survives() {
    let log = CdoLog::builder()
        .with_types(TypeRegistry::new().entity(
            EntityDefinition::new("Person")
                .property(PropertyDecl::new("id", TypeRef::int()).id())
                .property(PropertyDecl::new("name", TypeRef::string())),
        ))
        .with_repository(Arc::new(PanickingWrites::default()))
        .build()
        .expect("build log");
    let handle = spawn_auditor(log, RuntimeConfig::default());

    let (heap, root) = heap_with("Ann");
    let err = handle
        .commit("alice", heap, vec![root])
        .await
        .expect_err("write panics");
    assert!(matches!(err, RuntimeError::TaskFailed(_)), "{err}");

    let history = handle
        .snapshots_of(GlobalId::instance("Person", 1_i64), SnapshotQuery::all())
        .await
        .expect("loop still serving");
    assert!(history.is_empty());
    handle.shutdown().await.expect("shutdown");
}
