use std::sync::Arc;

use tempfile::TempDir;

use cdolog::{
    clock::ManualClock,
    commit::{Commit, id::CommitIdScheme},
    graph::{global_id::GlobalId, node::PropertyValue},
    log::CdoLog,
    metadata::registry::{
        EntityDefinition, PropertyDecl, TypeRef, TypeRegistry, ValueObjectDefinition,
    },
    object::{Instance, ObjectHeap, Value},
    persist::{
        CommitBound, Repository, RepositoryError, SnapshotQuery, memory::InMemoryRepository,
        sqlite::SqliteRepository,
    },
    shadow::VersionSelector,
    types::{CommitId, Scalar},
};

fn registry() -> TypeRegistry {
    TypeRegistry::new()
        .entity(
            EntityDefinition::new("Person")
                .property(PropertyDecl::new("id", TypeRef::int()).id())
                .property(PropertyDecl::new("name", TypeRef::string()))
                .property(PropertyDecl::new("tags", TypeRef::set(TypeRef::string())))
                .property(PropertyDecl::new("score", TypeRef::float()))
                .property(PropertyDecl::new("address", TypeRef::named("Address"))),
        )
        .value_object(
            ValueObjectDefinition::new("Address")
                .property(PropertyDecl::new("city", TypeRef::string())),
        )
}

fn open_log(repository: Arc<dyn Repository>) -> CdoLog {
    open_log_with(
        repository,
        CommitIdScheme::SynchronizedSequence,
        Arc::new(ManualClock::new(1_000)),
    )
}

fn open_log_with(
    repository: Arc<dyn Repository>,
    scheme: CommitIdScheme,
    clock: Arc<ManualClock>,
) -> CdoLog {
    CdoLog::builder()
        .with_types(registry())
        .with_repository(repository)
        .with_commit_id_generator(scheme)
        .with_clock(clock)
        .build()
        .expect("build log")
}

fn sample_heap() -> (ObjectHeap, cdolog::object::ObjRef) {
    let mut heap = ObjectHeap::new();
    let home = heap.alloc(Instance::new("Address").with("city", "Oslo"));
    let ann = heap.alloc(
        Instance::new("Person")
            .with("id", 1_i64)
            .with("name", "Ann")
            .with("tags", Value::Seq(vec![Value::text("a"), Value::text("b")]))
            .with("address", home),
    );
    (heap, ann)
}

#[test]
fn snapshots_survive_reopen() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("audit.db");
    let id = GlobalId::instance("Person", 1_i64);

    let (mut heap, ann) = sample_heap();
    let (first, second) = {
        let repo = Arc::new(SqliteRepository::open(&db_path).expect("open sqlite"));
        let log = open_log(repo);
        let first = log.commit("alice", &heap, &[ann]).expect("first");
        heap.get_mut(ann).expect("ann").set("name", "Anna");
        let second = log.commit("alice", &heap, &[ann]).expect("second");
        (first, second)
    };

    let repo = Arc::new(SqliteRepository::open(&db_path).expect("reopen"));
    assert_eq!(repo.head_id().expect("head"), Some(second.id()));

    let stored = repo.snapshots_of(&id, &SnapshotQuery::all()).expect("history");
    let expected: Vec<_> = [&second, &first]
        .iter()
        .filter_map(|c| c.snapshots().iter().find(|s| s.global_id == id).cloned())
        .collect();
    assert_eq!(stored, expected);
    assert_eq!(
        repo.commit_metadata(first.id()).expect("meta"),
        Some(first.metadata().clone())
    );

    let log = open_log(repo);
    heap.get_mut(ann).expect("ann").set("name", "Annie");
    let third = log.commit("alice", &heap, &[ann]).expect("third");
    assert!(third.id() > second.id());
    assert_eq!(third.diff().len(), 1);

    let shadow = log
        .shadow(&id, VersionSelector::AtCommit(first.id()))
        .expect("shadow");
    assert_eq!(
        shadow.root_instance().and_then(|p| p.get("name")),
        Some(&Value::text("Ann"))
    );
    let diff = log
        .compare(shadow.heap(), shadow.root(), &sample_heap().0, ann)
        .expect("compare");
    assert!(diff.is_empty(), "{}", diff.pretty_print());
}

#[test]
fn limited_queries_return_newest_first() {
    let repo = Arc::new(SqliteRepository::open_in_memory().expect("open"));
    let log = open_log(repo.clone());
    let (mut heap, ann) = sample_heap();
    for name in ["Ann", "Anna", "Annie"] {
        heap.get_mut(ann).expect("ann").set("name", name);
        log.commit("alice", &heap, &[ann]).expect("commit");
    }

    let id = GlobalId::instance("Person", 1_i64);
    let newest = repo
        .snapshots_of(&id, &SnapshotQuery::all().with_limit(2))
        .expect("history");
    let versions: Vec<u64> = newest.iter().map(|s| s.version).collect();
    assert_eq!(versions, vec![3, 2]);
    assert!(
        repo.snapshots_of(&GlobalId::instance("Person", 9_i64), &SnapshotQuery::all())
            .expect("history")
            .is_empty()
    );
}

#[test]
fn duplicate_commits_are_rejected_by_both_repositories() {
    let (heap, ann) = sample_heap();
    let repos: Vec<Arc<dyn Repository>> = vec![
        Arc::new(InMemoryRepository::new()),
        Arc::new(SqliteRepository::open_in_memory().expect("open")),
    ];
    for repo in repos {
        let log = open_log(repo.clone());
        let commit = log.commit("alice", &heap, &[ann]).expect("commit");
        let err = repo.persist(&commit).expect_err("duplicate");
        assert!(matches!(err, RepositoryError::DuplicateCommit(id) if id == commit.id()));
        assert_eq!(repo.head_id().expect("head"), Some(CommitId::new(1, 0)));
    }
}

fn stored_score(repo: &dyn Repository, id: &GlobalId) -> f64 {
    let latest = repo
        .latest_snapshot(id)
        .expect("read")
        .expect("snapshot");
    match latest.state.get("score") {
        PropertyValue::Scalar(Scalar::Float(v)) => *v,
        other => panic!("unexpected score {other:?}"),
    }
}

#[test]
fn non_finite_floats_survive_reopen() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("audit.db");
    let id = GlobalId::instance("Person", 1_i64);
    let (mut heap, ann) = sample_heap();

    {
        let log = open_log(Arc::new(SqliteRepository::open(&db_path).expect("open")));
        heap.get_mut(ann).expect("ann").set("score", f64::NAN);
        log.commit("alice", &heap, &[ann]).expect("nan");
        heap.get_mut(ann).expect("ann").set("score", f64::INFINITY);
        log.commit("alice", &heap, &[ann]).expect("inf");
    }

    let repo = Arc::new(SqliteRepository::open(&db_path).expect("reopen"));
    assert_eq!(stored_score(repo.as_ref(), &id), f64::INFINITY);
    let history = repo.snapshots_of(&id, &SnapshotQuery::all()).expect("history");
    assert_eq!(history.len(), 2);
    assert!(matches!(
        history[1].state.get("score"),
        PropertyValue::Scalar(Scalar::Float(v)) if v.is_nan()
    ));

    let log = open_log(repo.clone());
    let unchanged = log.commit("alice", &heap, &[ann]).expect("unchanged");
    assert!(unchanged.is_empty(), "{}", unchanged.diff().pretty_print());

    heap.get_mut(ann).expect("ann").set("score", f64::NEG_INFINITY);
    let lowered = log.commit("alice", &heap, &[ann]).expect("lowered");
    assert_eq!(lowered.diff().len(), 1);
    heap.get_mut(ann).expect("ann").set("score", f64::NAN);
    log.commit("alice", &heap, &[ann]).expect("nan again");
    assert!(stored_score(repo.as_ref(), &id).is_nan());
    assert!(log.commit("alice", &heap, &[ann]).expect("noop").is_empty());
}

fn versions_at(repo: &dyn Repository, id: &GlobalId, query: SnapshotQuery) -> Vec<u64> {
    repo.snapshots_of(id, &query)
        .expect("history")
        .iter()
        .map(|s| s.version)
        .collect()
}

fn bound_at(commit: &Commit, scheme: CommitIdScheme) -> CommitBound {
    CommitBound::AtOrBefore {
        id: commit.id(),
        timestamp_ms: commit.metadata().timestamp_ms,
        sequence: commit.metadata().sequence,
        scheme,
    }
}

#[test]
fn bounded_queries_agree_across_repositories() {
    let id = GlobalId::instance("Person", 1_i64);
    for scheme in [CommitIdScheme::SynchronizedSequence, CommitIdScheme::Random] {
        let repos: Vec<Arc<dyn Repository>> = vec![
            Arc::new(InMemoryRepository::new()),
            Arc::new(SqliteRepository::open_in_memory().expect("open")),
        ];
        for repo in repos {
            let clock = Arc::new(ManualClock::new(1_000));
            let log = open_log_with(repo.clone(), scheme, clock.clone());
            let (mut heap, ann) = sample_heap();
            let mut commits = Vec::new();
            for (name, step) in [("Ann", 0), ("Anna", 0), ("Annie", 5)] {
                clock.advance(step);
                heap.get_mut(ann).expect("ann").set("name", name);
                commits.push(log.commit("alice", &heap, &[ann]).expect("commit"));
            }

            for (at, commit) in commits.iter().enumerate() {
                let bound = bound_at(commit, scheme);
                let expected: Vec<u64> = (1..=at as u64 + 1).rev().collect();
                assert_eq!(
                    versions_at(repo.as_ref(), &id, SnapshotQuery::up_to(bound)),
                    expected,
                    "{scheme:?} at {}",
                    commit.id()
                );
                assert_eq!(
                    versions_at(repo.as_ref(), &id, SnapshotQuery::up_to(bound).with_limit(1)),
                    vec![at as u64 + 1]
                );
            }
            let at_time = |ts| SnapshotQuery::up_to(CommitBound::AtOrBeforeTime(ts));
            assert_eq!(versions_at(repo.as_ref(), &id, at_time(1_000)), vec![2, 1]);
            assert_eq!(versions_at(repo.as_ref(), &id, at_time(1_005)), vec![3, 2, 1]);
            assert!(versions_at(repo.as_ref(), &id, at_time(999)).is_empty());
            assert!(
                versions_at(repo.as_ref(), &id, SnapshotQuery::all().with_limit(0)).is_empty()
            );
        }
    }
}
