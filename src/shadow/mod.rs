//! Historical reconstruction of object graphs from snapshot chains.

use hashbrown::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    commit::{CdoSnapshot, CommitMetadata, id::CommitIdScheme},
    graph::{global_id::GlobalId, node::PropertyValue},
    metadata::classifier::TypeMapper,
    object::{Instance, ObjRef, ObjectHeap, Value},
    persist::{CommitBound, Repository, RepositoryError, SnapshotQuery},
    types::{CommitId, TimestampMs},
};

/// Which point in history a shadow reflects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionSelector {
    /// Newest snapshots.
    #[default]
    Latest,
    /// Snapshots written at or before this commit.
    AtCommit(CommitId),
    /// Snapshots written at or before this time.
    AtTime(TimestampMs),
}

/// How far references are followed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShadowScope {
    /// Only owned ValueObjects; Entity references become null.
    Shallow,
    /// Every reference.
    #[default]
    Deep,
}

/// Shadow failure.
#[derive(Debug, Error)]
pub enum ShadowError {
    /// No live snapshot at the requested point.
    #[error("no snapshot of {0} at the requested version")]
    NotFound(String),
    /// Selector names a commit that was never stored.
    #[error("unknown commit {0}")]
    UnknownCommit(CommitId),
    /// Repository read failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Materialized historical graph.
#[derive(Debug, Clone)]
pub struct Shadow {
    heap: ObjectHeap,
    root: ObjRef,
    commit: CommitMetadata,
}

impl Shadow {
    /// Arena holding the rebuilt instances.
    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    /// Rebuilt root.
    pub fn root(&self) -> ObjRef {
        self.root
    }

    /// Root instance.
    pub fn root_instance(&self) -> Option<&Instance> {
        self.heap.get(self.root)
    }

    /// Commit of the root snapshot.
    pub fn commit(&self) -> &CommitMetadata {
        &self.commit
    }

    /// Heap and root, for feeding back into compare or commit.
    pub fn into_parts(self) -> (ObjectHeap, ObjRef) {
        (self.heap, self.root)
    }
}

/// Rebuilds linked instances from the snapshots valid at a selector.
pub struct ShadowMaterializer<'a> {
    types: &'a TypeMapper,
    repository: &'a dyn Repository,
    scheme: CommitIdScheme,
}

struct Run<'r> {
    query: SnapshotQuery,
    scope: ShadowScope,
    heap: ObjectHeap,
    memo: HashMap<GlobalId, ObjRef>,
    missing: HashSet<GlobalId>,
    pending: Vec<(ObjRef, CdoSnapshot)>,
    materializer: &'r ShadowMaterializer<'r>,
}

impl<'a> ShadowMaterializer<'a> {
    /// Materializer reading `repository`; `scheme` decides commit ordering.
    pub fn new(types: &'a TypeMapper, repository: &'a dyn Repository, scheme: CommitIdScheme) -> Self {
        Self {
            types,
            repository,
            scheme,
        }
    }

    /// Shadow of `id` at `selector`.
    pub fn materialize(
        &self,
        id: &GlobalId,
        selector: VersionSelector,
        scope: ShadowScope,
    ) -> Result<Shadow, ShadowError> {
        let query = self.query_for(selector)?;
        let Some(snapshot) = self.snapshot_at(id, &query)? else {
            warn!(global_id = %id, ?selector, "no live snapshot for shadow root");
            return Err(ShadowError::NotFound(id.to_string()));
        };
        let commit = snapshot.commit.clone();

        let mut run = Run {
            query,
            scope,
            heap: ObjectHeap::new(),
            memo: HashMap::new(),
            missing: HashSet::new(),
            pending: Vec::new(),
            materializer: self,
        };
        let root = run.place(snapshot);
        run.drain()?;
        debug!(global_id = %id, instances = run.heap.len(), "shadow materialized");

        Ok(Shadow {
            heap: run.heap,
            root,
            commit,
        })
    }

    fn query_for(&self, selector: VersionSelector) -> Result<SnapshotQuery, ShadowError> {
        let bound = match selector {
            VersionSelector::Latest => return Ok(SnapshotQuery::latest()),
            VersionSelector::AtTime(ts) => CommitBound::AtOrBeforeTime(ts),
            VersionSelector::AtCommit(id) => {
                let (timestamp_ms, sequence) =
                    match (self.repository.commit_metadata(id)?, self.scheme) {
                        (Some(meta), _) => (meta.timestamp_ms, meta.sequence),
                        (None, CommitIdScheme::SynchronizedSequence) => (0, 0),
                        (None, CommitIdScheme::Random) => {
                            return Err(ShadowError::UnknownCommit(id));
                        }
                    };
                CommitBound::AtOrBefore {
                    id,
                    timestamp_ms,
                    sequence,
                    scheme: self.scheme,
                }
            }
        };
        Ok(SnapshotQuery::up_to(bound).with_limit(1))
    }

    fn snapshot_at(
        &self,
        id: &GlobalId,
        query: &SnapshotQuery,
    ) -> Result<Option<CdoSnapshot>, RepositoryError> {
        let found = self.repository.snapshots_of(id, query)?.into_iter().next();
        Ok(found.filter(|s| !s.is_terminal()))
    }

    fn class_of(&self, snapshot: &CdoSnapshot) -> String {
        self.types
            .managed_type_by_name(&snapshot.type_name)
            .map_or_else(|| snapshot.type_name.clone(), |t| t.class().to_string())
    }
}

impl Run<'_> {
    fn place(&mut self, snapshot: CdoSnapshot) -> ObjRef {
        let obj = self
            .heap
            .alloc(Instance::new(self.materializer.class_of(&snapshot)));
        self.memo.insert(snapshot.global_id.clone(), obj);
        self.pending.push((obj, snapshot));
        obj
    }

    fn drain(&mut self) -> Result<(), ShadowError> {
        while let Some((obj, snapshot)) = self.pending.pop() {
            let mut values = Vec::with_capacity(snapshot.state.len());
            for (name, value) in snapshot.state.iter() {
                values.push((name.to_string(), self.convert(value)?));
            }
            if let Some(instance) = self.heap.get_mut(obj) {
                for (name, value) in values {
                    instance.set(name, value);
                }
            }
        }
        Ok(())
    }

    fn convert(&mut self, value: &PropertyValue) -> Result<Value, ShadowError> {
        Ok(match value {
            PropertyValue::Null => Value::Null,
            PropertyValue::Scalar(s) => Value::Scalar(s.clone()),
            PropertyValue::Ref(id) => self.resolve(id)?,
            PropertyValue::Collection(items) => Value::Seq(
                items
                    .iter()
                    .map(|item| self.convert(item))
                    .collect::<Result<Vec<_>, ShadowError>>()?,
            ),
            PropertyValue::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((self.convert(k)?, self.convert(v)?));
                }
                Value::Map(out)
            }
        })
    }

    fn resolve(&mut self, id: &GlobalId) -> Result<Value, ShadowError> {
        if let Some(obj) = self.memo.get(id) {
            return Ok(Value::Ref(*obj));
        }
        if self.missing.contains(id) {
            return Ok(Value::Null);
        }
        if self.scope == ShadowScope::Shallow && !id.is_value_object() {
            return Ok(Value::Null);
        }
        match self.materializer.snapshot_at(id, &self.query)? {
            Some(snapshot) => Ok(Value::Ref(self.place(snapshot))),
            None => {
                debug!(global_id = %id, "shadow reference left unresolved");
                self.missing.insert(id.clone());
                Ok(Value::Null)
            }
        }
    }
}
