use hashbrown::{HashMap, HashSet};
use tracing::debug;

use super::{CdoSnapshot, Commit, CommitMetadata};
use crate::{
    diff::{
        Diff, DiffEngine, DiffOptions,
        change::{Change, ChangeKind},
    },
    graph::{
        global_id::GlobalId,
        node::{ObjectGraph, PropertyMap},
    },
    metadata::classifier::TypeMapper,
    persist::{Repository, RepositoryResult},
    types::SnapshotKind,
};

/// Builds commits by diffing live graphs against the latest snapshots.
pub struct CommitFactory<'a> {
    types: &'a TypeMapper,
    repository: &'a dyn Repository,
    options: DiffOptions,
}

impl<'a> CommitFactory<'a> {
    /// Factory reading previous state from `repository`.
    pub fn new(types: &'a TypeMapper, repository: &'a dyn Repository, options: DiffOptions) -> Self {
        Self {
            types,
            repository,
            options,
        }
    }

    /// Commit recording how `current` differs from the stored history.
    ///
    /// The result is empty when nothing changed; the caller decides whether
    /// to persist it.
    pub fn create(&self, metadata: CommitMetadata, current: &ObjectGraph) -> RepositoryResult<Commit> {
        let latest = self.load_latest(current.ids().cloned())?;
        let mut previous = ObjectGraph::new();
        for snapshot in latest.values().filter(|s| !s.is_terminal()) {
            previous.insert(snapshot.to_node());
        }

        let diff = DiffEngine::new(self.types, self.options).diff(&previous, current);
        let snapshots = self.snapshots(&metadata, &diff, current, &latest);
        debug!(
            commit = %metadata.id,
            changes = diff.len(),
            snapshots = snapshots.len(),
            "commit assembled"
        );
        Ok(Commit::new(metadata, diff, snapshots))
    }

    /// Commit terminating `id` and the ValueObjects it owns. `None` when
    /// `id` has no live snapshot.
    pub fn terminate(&self, metadata: CommitMetadata, id: &GlobalId) -> RepositoryResult<Option<Commit>> {
        match self.repository.latest_snapshot(id)? {
            Some(s) if !s.is_terminal() => {}
            _ => return Ok(None),
        }
        let latest = self.load_latest(std::iter::once(id.clone()))?;

        let mut changes: Vec<Change> = Vec::new();
        let mut snapshots = Vec::new();
        let mut live: Vec<&CdoSnapshot> = latest.values().filter(|s| !s.is_terminal()).collect();
        live.sort_by(|a, b| a.global_id.cmp(&b.global_id));
        for snapshot in live {
            changes.push(Change::new(
                snapshot.global_id.clone(),
                snapshot.type_name.clone(),
                ChangeKind::ObjectRemoved,
            ));
            snapshots.push(next_snapshot(
                &metadata,
                snapshot.global_id.clone(),
                snapshot.type_name.clone(),
                SnapshotKind::Terminal,
                PropertyMap::new(),
                Vec::new(),
                Some(snapshot),
            ));
        }
        Ok(Some(Commit::new(metadata, Diff::new(changes), snapshots)))
    }

    /// Latest snapshot of every seed id plus, transitively, of every
    /// ValueObject their live snapshots reference.
    fn load_latest(
        &self,
        seeds: impl Iterator<Item = GlobalId>,
    ) -> RepositoryResult<HashMap<GlobalId, CdoSnapshot>> {
        let mut latest = HashMap::new();
        let mut seen: HashSet<GlobalId> = HashSet::new();
        let mut queue: Vec<GlobalId> = seeds.collect();

        while let Some(id) = queue.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(snapshot) = self.repository.latest_snapshot(&id)? else {
                continue;
            };
            if !snapshot.is_terminal() {
                queue.extend(
                    snapshot
                        .state
                        .references()
                        .into_iter()
                        .filter(|r| r.is_value_object() && !seen.contains(*r))
                        .cloned(),
                );
            }
            latest.insert(id, snapshot);
        }
        Ok(latest)
    }

    fn snapshots(
        &self,
        metadata: &CommitMetadata,
        diff: &Diff,
        current: &ObjectGraph,
        latest: &HashMap<GlobalId, CdoSnapshot>,
    ) -> Vec<CdoSnapshot> {
        let mut out = Vec::new();
        for (id, changes) in diff.changes_by_object() {
            let previous = latest.get(id);
            let changed: Vec<String> = changes
                .iter()
                .filter_map(|c| c.property().map(str::to_string))
                .collect();
            let removed = changes
                .iter()
                .any(|c| matches!(c.kind(), ChangeKind::ObjectRemoved));

            if removed {
                let Some(prev) = previous else {
                    continue;
                };
                out.push(next_snapshot(
                    metadata,
                    id.clone(),
                    prev.type_name.clone(),
                    SnapshotKind::Terminal,
                    PropertyMap::new(),
                    changed,
                    previous,
                ));
                continue;
            }

            let Some(node) = current.get(id) else {
                continue;
            };
            let created = changes
                .iter()
                .any(|c| matches!(c.kind(), ChangeKind::NewObject));
            let (kind, changed) = if created {
                let changed = if changed.is_empty() {
                    node.state().names().map(str::to_string).collect()
                } else {
                    changed
                };
                (SnapshotKind::Initial, changed)
            } else {
                (SnapshotKind::Update, changed)
            };
            out.push(next_snapshot(
                metadata,
                id.clone(),
                node.type_name().to_string(),
                kind,
                node.state().clone(),
                changed,
                previous,
            ));
        }
        out
    }
}

fn next_snapshot(
    metadata: &CommitMetadata,
    global_id: GlobalId,
    type_name: String,
    kind: SnapshotKind,
    state: PropertyMap,
    changed: Vec<String>,
    previous: Option<&CdoSnapshot>,
) -> CdoSnapshot {
    CdoSnapshot {
        global_id,
        type_name,
        commit: metadata.clone(),
        kind,
        state,
        changed,
        version: previous.map_or(1, |p| p.version + 1),
        previous: previous.map(|p| p.commit.id),
    }
}
