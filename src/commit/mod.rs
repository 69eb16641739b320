//! Commits, snapshots and commit id allocation.

/// Turns graph diffs into commits.
pub mod factory;
/// Commit id generators.
pub mod id;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    diff::Diff,
    graph::{global_id::GlobalId, node::{Node, PropertyMap}},
    types::{CommitId, SnapshotKind, SnapshotVersion, TimestampMs},
};

/// Who committed what and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMetadata {
    /// Commit id.
    pub id: CommitId,
    /// Author label.
    pub author: String,
    /// Commit time in ms since the Unix epoch.
    pub timestamp_ms: TimestampMs,
    /// Local write order; strictly increases within one repository.
    #[serde(default)]
    pub sequence: u64,
    /// Arbitrary commit properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Immutable record of one node's state at one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdoSnapshot {
    /// Node identity.
    pub global_id: GlobalId,
    /// Managed type name at commit time.
    pub type_name: String,
    /// Commit that wrote this snapshot.
    pub commit: CommitMetadata,
    /// Lifecycle position.
    pub kind: SnapshotKind,
    /// Full captured state; empty for terminal snapshots.
    pub state: PropertyMap,
    /// Properties changed by this commit.
    pub changed: Vec<String>,
    /// Per-GlobalId version, starting at 1.
    pub version: SnapshotVersion,
    /// Commit of the previous snapshot of this node.
    pub previous: Option<CommitId>,
}

impl CdoSnapshot {
    /// True for terminal snapshots.
    pub fn is_terminal(&self) -> bool {
        self.kind == SnapshotKind::Terminal
    }

    /// Rebuilds the captured node.
    pub fn to_node(&self) -> Node {
        Node::new(self.global_id.clone(), self.type_name.clone(), self.state.clone())
    }
}

/// Atomic unit of persisted change.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    metadata: CommitMetadata,
    diff: Diff,
    snapshots: Vec<CdoSnapshot>,
}

impl Commit {
    /// Assembles a commit.
    pub fn new(metadata: CommitMetadata, diff: Diff, snapshots: Vec<CdoSnapshot>) -> Self {
        Self {
            metadata,
            diff,
            snapshots,
        }
    }

    /// Commit id.
    pub fn id(&self) -> CommitId {
        self.metadata.id
    }

    /// Author, time and properties.
    pub fn metadata(&self) -> &CommitMetadata {
        &self.metadata
    }

    /// Changes recorded by this commit.
    pub fn diff(&self) -> &Diff {
        &self.diff
    }

    /// Snapshots written by this commit, in GlobalId order.
    pub fn snapshots(&self) -> &[CdoSnapshot] {
        &self.snapshots
    }

    /// True when nothing changed; empty commits are never persisted.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
