use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::CommitId;

/// How commit ids are allocated and ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitIdScheme {
    /// Increasing major numbers; ids order commits.
    #[default]
    SynchronizedSequence,
    /// Random majors; commits are ordered by timestamp, then by local
    /// sequence.
    Random,
}

/// Source of fresh commit ids.
pub trait CommitIdGenerator: Send + Sync {
    /// Allocates the next id.
    fn next_id(&self) -> CommitId;

    /// Ordering scheme of the ids handed out.
    fn scheme(&self) -> CommitIdScheme;
}

/// Atomic counter seeded from the repository head.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    last_major: AtomicU64,
}

impl SequenceGenerator {
    /// Generator whose first id follows `head`.
    pub fn starting_after(head: Option<CommitId>) -> Self {
        Self {
            last_major: AtomicU64::new(head.map_or(0, |h| h.major)),
        }
    }
}

impl CommitIdGenerator for SequenceGenerator {
    fn next_id(&self) -> CommitId {
        let major = self.last_major.fetch_add(1, Ordering::SeqCst) + 1;
        CommitId::new(major, 0)
    }

    fn scheme(&self) -> CommitIdScheme {
        CommitIdScheme::SynchronizedSequence
    }
}

/// Local commit counter seeded from the repository; breaks timestamp ties
/// between commits whose ids carry no order.
#[derive(Debug, Default)]
pub struct CommitSequence {
    last: AtomicU64,
}

impl CommitSequence {
    /// Counter whose first value follows `last`.
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    /// Allocates the next value.
    pub fn next_value(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Random, non-zero majors.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomGenerator;

impl CommitIdGenerator for RandomGenerator {
    fn next_id(&self) -> CommitId {
        loop {
            let major = rand::random::<u64>() >> 1;
            if major != 0 {
                return CommitId::new(major, 0);
            }
        }
    }

    fn scheme(&self) -> CommitIdScheme {
        CommitIdScheme::Random
    }
}
