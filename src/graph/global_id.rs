use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use crate::types::Scalar;

/// Identity value of an Entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocalId {
    /// Integer identity.
    Int(i64),
    /// Text identity.
    Text(String),
}

impl LocalId {
    /// Converts an identity scalar; floats and booleans are not identities.
    pub fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Int(v) => Some(Self::Int(*v)),
            Scalar::Text(v) => Some(Self::Text(v.clone())),
            Scalar::Bool(_) | Scalar::Float(_) => None,
        }
    }

    /// Scalar form, as stored in the identity property.
    pub fn to_scalar(&self) -> Scalar {
        match self {
            Self::Int(v) => Scalar::Int(*v),
            Self::Text(v) => Scalar::Text(v.clone()),
        }
    }
}

impl From<i64> for LocalId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for LocalId {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for LocalId {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Stable identifier of a graph node across versions.
///
/// ValueObject ids always hang off a root owner (an Entity or an unbounded
/// ValueObject); nested paths are joined with `/` in the fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalId {
    /// Entity: type name plus identity value, `Person/1`.
    Instance {
        /// Entity type name.
        type_name: String,
        /// Identity value.
        local_id: LocalId,
    },
    /// ValueObject owned by another node, `Person/1#address`.
    ValueObject {
        /// Root owner.
        owner: Box<GlobalId>,
        /// Property path from the owner.
        fragment: String,
    },
    /// ValueObject used as a graph root, `Address/`.
    Unbounded {
        /// ValueObject type name.
        type_name: String,
    },
}

impl GlobalId {
    /// Entity id.
    pub fn instance(type_name: impl Into<String>, local_id: impl Into<LocalId>) -> Self {
        Self::Instance {
            type_name: type_name.into(),
            local_id: local_id.into(),
        }
    }

    /// Root ValueObject id.
    pub fn unbounded(type_name: impl Into<String>) -> Self {
        Self::Unbounded {
            type_name: type_name.into(),
        }
    }

    /// Id of the ValueObject reached from `self` through `fragment`.
    pub fn child(&self, fragment: &str) -> Self {
        match self {
            Self::ValueObject {
                owner,
                fragment: own,
            } => Self::ValueObject {
                owner: owner.clone(),
                fragment: format!("{own}/{fragment}"),
            },
            root => Self::ValueObject {
                owner: Box::new(root.clone()),
                fragment: fragment.to_string(),
            },
        }
    }

    /// True for ValueObject ids, owned or unbounded.
    pub fn is_value_object(&self) -> bool {
        !matches!(self, Self::Instance { .. })
    }

    /// Root owner of this id; Entities and unbounded ids own themselves.
    pub fn root_owner(&self) -> &GlobalId {
        match self {
            Self::ValueObject { owner, .. } => owner.root_owner(),
            root => root,
        }
    }

    /// Type name carried by the id itself.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Instance { type_name, .. } | Self::Unbounded { type_name } => Some(type_name),
            Self::ValueObject { .. } => None,
        }
    }

    fn root_key(&self) -> (&str, Option<&LocalId>) {
        match self {
            Self::Instance {
                type_name,
                local_id,
            } => (type_name.as_str(), Some(local_id)),
            Self::Unbounded { type_name } => (type_name.as_str(), None),
            Self::ValueObject { owner, .. } => owner.root_key(),
        }
    }

    fn push_path<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Self::ValueObject { owner, fragment } = self {
            owner.push_path(out);
            out.push(fragment.as_str());
        }
    }
}

impl Ord for GlobalId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.root_key().cmp(&other.root_key()).then_with(|| {
            let (mut left, mut right) = (Vec::new(), Vec::new());
            self.push_path(&mut left);
            other.push_path(&mut right);
            left.cmp(&right)
        })
    }
}

impl PartialOrd for GlobalId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance {
                type_name,
                local_id,
            } => write!(f, "{type_name}/{local_id}"),
            Self::Unbounded { type_name } => write!(f, "{type_name}/"),
            Self::ValueObject { owner, fragment } => write!(f, "{owner}#{fragment}"),
        }
    }
}
