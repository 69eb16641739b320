use std::{collections::BTreeMap, sync::RwLock};

use hashbrown::HashMap;

use super::{Repository, RepositoryError, RepositoryResult, SnapshotQuery};
use crate::{
    commit::{CdoSnapshot, Commit, CommitMetadata},
    graph::global_id::GlobalId,
    types::CommitId,
};

#[derive(Debug, Default)]
struct MemoryState {
    histories: HashMap<GlobalId, Vec<CdoSnapshot>>,
    commits: BTreeMap<CommitId, CommitMetadata>,
}

/// Process-local repository, handy for tests and short-lived audits.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored commits.
    pub fn commit_count(&self) -> RepositoryResult<usize> {
        let guard = self.state.read().map_err(|_| poisoned())?;
        Ok(guard.commits.len())
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Message("repository lock poisoned".to_string())
}

impl Repository for InMemoryRepository {
    fn ensure_schema(&self) -> RepositoryResult<()> {
        Ok(())
    }

    fn snapshots_of(
        &self,
        id: &GlobalId,
        query: &SnapshotQuery,
    ) -> RepositoryResult<Vec<CdoSnapshot>> {
        let guard = self.state.read().map_err(|_| poisoned())?;
        Ok(guard
            .histories
            .get(id)
            .map(|history| query.select(history.iter().rev()))
            .unwrap_or_default())
    }

    fn persist(&self, commit: &Commit) -> RepositoryResult<()> {
        let mut guard = self.state.write().map_err(|_| poisoned())?;
        if guard.commits.contains_key(&commit.id()) {
            return Err(RepositoryError::DuplicateCommit(commit.id()));
        }
        for snapshot in commit.snapshots() {
            let latest = guard
                .histories
                .get(&snapshot.global_id)
                .and_then(|h| h.last())
                .map_or(0, |s| s.version);
            if snapshot.version <= latest {
                return Err(RepositoryError::Message(format!(
                    "stale snapshot {} v{} (stored v{latest})",
                    snapshot.global_id, snapshot.version
                )));
            }
        }

        guard.commits.insert(commit.id(), commit.metadata().clone());
        for snapshot in commit.snapshots() {
            guard
                .histories
                .entry(snapshot.global_id.clone())
                .or_default()
                .push(snapshot.clone());
        }
        Ok(())
    }

    fn head_id(&self) -> RepositoryResult<Option<CommitId>> {
        let guard = self.state.read().map_err(|_| poisoned())?;
        Ok(guard.commits.keys().next_back().copied())
    }

    fn last_sequence(&self) -> RepositoryResult<u64> {
        let guard = self.state.read().map_err(|_| poisoned())?;
        Ok(guard.commits.values().map(|c| c.sequence).max().unwrap_or(0))
    }

    fn commit_metadata(&self, id: CommitId) -> RepositoryResult<Option<CommitMetadata>> {
        let guard = self.state.read().map_err(|_| poisoned())?;
        Ok(guard.commits.get(&id).cloned())
    }
}
