//! Shared primitive identifiers, scalars and snapshot enums.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;
/// Per-GlobalId snapshot version, starting at 1.
pub type SnapshotVersion = u64;

/// Immutable leaf value compared by equality and never traversed.
///
/// Floats compare by `f64::total_cmp` with every NaN equal to every other NaN, so
/// `0.0` and `-0.0` differ and a NaN property equals itself across versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Scalar {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(#[serde(with = "float_repr")] f64),
    /// UTF-8 text.
    Text(String),
}

impl Scalar {
    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) => 1,
            Self::Float(_) => 2,
            Self::Text(_) => 3,
        }
    }
}

fn float_cmp(a: f64, b: f64) -> Ordering {
    if a.is_nan() && b.is_nan() {
        Ordering::Equal
    } else {
        a.total_cmp(&b)
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => float_cmp(*a, *b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// JSON has no NaN or infinity; those travel as strings.
mod float_repr {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid float {other:?}"))),
            },
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Commit identifier.
///
/// The synchronized sequence scheme bumps `major` once per commit call and
/// leaves `minor` at zero. The random scheme fills `major` with a random
/// value, in which case ids are unique but carry no ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CommitId {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u32,
}

impl CommitId {
    /// Builds a commit id from both components.
    pub fn new(major: u64, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Lifecycle position of a persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotKind {
    /// First snapshot of an object.
    Initial,
    /// Snapshot of a changed object.
    Update,
    /// Object removed; the state is empty.
    Terminal,
}

impl SnapshotKind {
    /// Stable integer code used by storage adapters.
    pub fn code(self) -> i64 {
        match self {
            Self::Initial => 1,
            Self::Update => 2,
            Self::Terminal => 3,
        }
    }
}
