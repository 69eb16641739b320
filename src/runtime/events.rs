//! Runtime event stream payloads.

use crate::{graph::global_id::GlobalId, types::CommitId};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    /// A commit with at least one snapshot was persisted.
    Committed {
        /// Persisted commit.
        commit_id: CommitId,
        /// Commit author.
        author: String,
        /// Number of snapshots written.
        snapshots: usize,
    },
    /// An object was terminated by a shallow delete.
    Deleted {
        /// Terminated object.
        global_id: GlobalId,
        /// Commit that terminated it.
        commit_id: CommitId,
    },
}
