//! Append-only snapshot repositories.

/// RwLock-guarded in-memory repository.
pub mod memory;
/// SQLite-backed repository.
pub mod sqlite;

use thiserror::Error;

use crate::{
    commit::{CdoSnapshot, Commit, CommitMetadata, id::CommitIdScheme},
    graph::global_id::GlobalId,
    types::{CommitId, TimestampMs},
};

/// Persistence failure. The core performs no retry or cleanup.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// SQLite error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Encoding or decoding failure.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// A commit with this id is already stored.
    #[error("commit {0} already persisted")]
    DuplicateCommit(CommitId),
    /// Any other backend failure.
    #[error("{0}")]
    Message(String),
}

/// Result alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Upper bound on the commits a snapshot query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitBound {
    /// Snapshots written at or before the given commit.
    AtOrBefore {
        /// Bounding commit.
        id: CommitId,
        /// Its timestamp, used when ids carry no ordering.
        timestamp_ms: TimestampMs,
        /// Its local sequence, breaking timestamp ties.
        sequence: u64,
        /// Ordering scheme of the stored ids.
        scheme: CommitIdScheme,
    },
    /// Snapshots written at or before the given time.
    AtOrBeforeTime(TimestampMs),
}

impl CommitBound {
    /// True when a commit falls inside the bound.
    pub fn admits(&self, commit: &CommitMetadata) -> bool {
        match *self {
            Self::AtOrBefore {
                id,
                timestamp_ms,
                sequence,
                scheme,
            } => match scheme {
                CommitIdScheme::SynchronizedSequence => commit.id <= id,
                CommitIdScheme::Random => {
                    commit.id == id
                        || (commit.timestamp_ms, commit.sequence) <= (timestamp_ms, sequence)
                }
            },
            Self::AtOrBeforeTime(ts) => commit.timestamp_ms <= ts,
        }
    }
}

/// Filter for [`Repository::snapshots_of`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotQuery {
    /// Only snapshots of commits inside this bound.
    pub bound: Option<CommitBound>,
    /// Maximum number of snapshots returned.
    pub limit: Option<usize>,
}

impl SnapshotQuery {
    /// Every snapshot.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the newest snapshot.
    pub fn latest() -> Self {
        Self::default().with_limit(1)
    }

    /// Snapshots inside `bound`.
    pub fn up_to(bound: CommitBound) -> Self {
        Self {
            bound: Some(bound),
            limit: None,
        }
    }

    /// Caps the result length.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when `snapshot` passes the bound.
    pub fn admits(&self, snapshot: &CdoSnapshot) -> bool {
        self.bound.is_none_or(|b| b.admits(&snapshot.commit))
    }

    fn select<'a>(&self, newest_first: impl Iterator<Item = &'a CdoSnapshot>) -> Vec<CdoSnapshot> {
        newest_first
            .filter(|s| self.admits(s))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Storage of commits and snapshots. Implementations guard their own state
/// and persist each commit all-or-nothing.
pub trait Repository: Send + Sync {
    /// Creates storage structures; idempotent.
    fn ensure_schema(&self) -> RepositoryResult<()>;

    /// Snapshots of `id` matching `query`, newest first.
    fn snapshots_of(&self, id: &GlobalId, query: &SnapshotQuery)
    -> RepositoryResult<Vec<CdoSnapshot>>;

    /// Newest snapshot of `id`, terminal ones included.
    fn latest_snapshot(&self, id: &GlobalId) -> RepositoryResult<Option<CdoSnapshot>> {
        Ok(self.snapshots_of(id, &SnapshotQuery::latest())?.into_iter().next())
    }

    /// Stores every snapshot of `commit` atomically.
    fn persist(&self, commit: &Commit) -> RepositoryResult<()>;

    /// Highest stored commit id.
    fn head_id(&self) -> RepositoryResult<Option<CommitId>>;

    /// Highest stored commit sequence, 0 when empty.
    fn last_sequence(&self) -> RepositoryResult<u64>;

    /// Metadata of a stored commit.
    fn commit_metadata(&self, id: CommitId) -> RepositoryResult<Option<CommitMetadata>>;
}
