use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{global_id::GlobalId, node::PropertyValue};

/// One index-addressed edit inside a list or array.
///
/// Indexes refer to the sequence as it is being rewritten, so applying a
/// change list in order turns the old sequence into the new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementChange {
    /// Element inserted at `index`.
    ValueAdded {
        /// Insert position.
        index: usize,
        /// Inserted element.
        value: PropertyValue,
    },
    /// Element removed from `index`.
    ValueRemoved {
        /// Removal position.
        index: usize,
        /// Removed element.
        value: PropertyValue,
    },
    /// Element at `index` replaced.
    ElementValueChange {
        /// Position.
        index: usize,
        /// Old element.
        left: PropertyValue,
        /// New element.
        right: PropertyValue,
    },
}

impl ElementChange {
    /// Position the edit applies to.
    pub fn index(&self) -> usize {
        match self {
            Self::ValueAdded { index, .. }
            | Self::ValueRemoved { index, .. }
            | Self::ElementValueChange { index, .. } => *index,
        }
    }

    /// Edit that undoes this one.
    pub fn inverse(&self) -> Self {
        match self.clone() {
            Self::ValueAdded { index, value } => Self::ValueRemoved { index, value },
            Self::ValueRemoved { index, value } => Self::ValueAdded { index, value },
            Self::ElementValueChange { index, left, right } => Self::ElementValueChange {
                index,
                left: right,
                right: left,
            },
        }
    }

    /// Applies the edit to `items`; out-of-range positions are clamped.
    pub fn apply(&self, items: &mut Vec<PropertyValue>) {
        match self {
            Self::ValueAdded { index, value } => {
                let at = (*index).min(items.len());
                items.insert(at, value.clone());
            }
            Self::ValueRemoved { index, .. } => {
                if *index < items.len() {
                    items.remove(*index);
                }
            }
            Self::ElementValueChange { index, right, .. } => {
                if let Some(slot) = items.get_mut(*index) {
                    *slot = right.clone();
                }
            }
        }
    }
}

/// Map entry whose value changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryChange {
    /// Entry key.
    pub key: PropertyValue,
    /// Old value.
    pub left: PropertyValue,
    /// New value.
    pub right: PropertyValue,
}

/// What happened to the affected node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Node only present in the new graph.
    NewObject,
    /// Node only present in the old graph.
    ObjectRemoved,
    /// Scalar (or custom) property changed.
    ValueChange {
        /// Property name.
        property: String,
        /// Old value.
        left: PropertyValue,
        /// New value.
        right: PropertyValue,
        /// Printable old value.
        left_display: String,
        /// Printable new value.
        right_display: String,
    },
    /// Entity or ValueObject reference changed.
    ReferenceChange {
        /// Property name.
        property: String,
        /// Old target.
        left: Option<GlobalId>,
        /// New target.
        right: Option<GlobalId>,
    },
    /// List elements changed.
    ListChange {
        /// Property name.
        property: String,
        /// Ordered element edits.
        changes: Vec<ElementChange>,
    },
    /// Array elements changed.
    ArrayChange {
        /// Property name.
        property: String,
        /// Ordered element edits.
        changes: Vec<ElementChange>,
    },
    /// Set membership changed.
    SetChange {
        /// Property name.
        property: String,
        /// Elements only in the new set.
        added: Vec<PropertyValue>,
        /// Elements only in the old set.
        removed: Vec<PropertyValue>,
    },
    /// Map entries changed.
    MapChange {
        /// Property name.
        property: String,
        /// Entries only in the new map.
        added: Vec<(PropertyValue, PropertyValue)>,
        /// Entries only in the old map.
        removed: Vec<(PropertyValue, PropertyValue)>,
        /// Entries present in both with different values.
        changed: Vec<EntryChange>,
    },
}

/// One typed change, attached to the node it affects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    affected: GlobalId,
    type_name: String,
    kind: ChangeKind,
}

impl Change {
    /// Builds a change.
    pub fn new(affected: GlobalId, type_name: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            affected,
            type_name: type_name.into(),
            kind,
        }
    }

    /// Affected node.
    pub fn affected(&self) -> &GlobalId {
        &self.affected
    }

    /// Managed type name of the affected node.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Change payload.
    pub fn kind(&self) -> &ChangeKind {
        &self.kind
    }

    /// Changed property; `None` for object-level changes.
    pub fn property(&self) -> Option<&str> {
        match &self.kind {
            ChangeKind::NewObject | ChangeKind::ObjectRemoved => None,
            ChangeKind::ValueChange { property, .. }
            | ChangeKind::ReferenceChange { property, .. }
            | ChangeKind::ListChange { property, .. }
            | ChangeKind::ArrayChange { property, .. }
            | ChangeKind::SetChange { property, .. }
            | ChangeKind::MapChange { property, .. } => Some(property),
        }
    }

    /// True for NewObject and ObjectRemoved.
    pub fn is_object_change(&self) -> bool {
        self.property().is_none()
    }

    /// Change describing the opposite transition.
    pub fn inverse(&self) -> Self {
        let kind = match self.kind.clone() {
            ChangeKind::NewObject => ChangeKind::ObjectRemoved,
            ChangeKind::ObjectRemoved => ChangeKind::NewObject,
            ChangeKind::ValueChange {
                property,
                left,
                right,
                left_display,
                right_display,
            } => ChangeKind::ValueChange {
                property,
                left: right,
                right: left,
                left_display: right_display,
                right_display: left_display,
            },
            ChangeKind::ReferenceChange {
                property,
                left,
                right,
            } => ChangeKind::ReferenceChange {
                property,
                left: right,
                right: left,
            },
            ChangeKind::ListChange { property, changes } => ChangeKind::ListChange {
                property,
                changes: invert_elements(&changes),
            },
            ChangeKind::ArrayChange { property, changes } => ChangeKind::ArrayChange {
                property,
                changes: invert_elements(&changes),
            },
            ChangeKind::SetChange {
                property,
                added,
                removed,
            } => ChangeKind::SetChange {
                property,
                added: removed,
                removed: added,
            },
            ChangeKind::MapChange {
                property,
                added,
                removed,
                changed,
            } => ChangeKind::MapChange {
                property,
                added: removed,
                removed: added,
                changed: changed
                    .into_iter()
                    .map(|c| EntryChange {
                        key: c.key,
                        left: c.right,
                        right: c.left,
                    })
                    .collect(),
            },
        };
        Self {
            affected: self.affected.clone(),
            type_name: self.type_name.clone(),
            kind,
        }
    }
}

/// Inverts edits written left to right, keeping that order. An edit at
/// position `p` of the rewritten sequence sits at `p + removed - added` of
/// the old one, counting the edits before it.
fn invert_elements(changes: &[ElementChange]) -> Vec<ElementChange> {
    let (mut added, mut removed) = (0usize, 0usize);
    let mut out = Vec::with_capacity(changes.len());
    for change in changes {
        let index = change.index() + removed - added;
        out.push(match change {
            ElementChange::ValueAdded { value, .. } => {
                added += 1;
                ElementChange::ValueRemoved { index, value: value.clone() }
            }
            ElementChange::ValueRemoved { value, .. } => {
                removed += 1;
                ElementChange::ValueAdded { index, value: value.clone() }
            }
            ElementChange::ElementValueChange { left, right, .. } => {
                ElementChange::ElementValueChange {
                    index,
                    left: right.clone(),
                    right: left.clone(),
                }
            }
        });
    }
    out
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ChangeKind::NewObject => write!(f, "new object {}", self.affected),
            ChangeKind::ObjectRemoved => write!(f, "object removed {}", self.affected),
            ChangeKind::ValueChange {
                property,
                left_display,
                right_display,
                ..
            } => write!(
                f,
                "{}.{property}: '{left_display}' -> '{right_display}'",
                self.affected
            ),
            ChangeKind::ReferenceChange {
                property,
                left,
                right,
            } => write!(
                f,
                "{}.{property}: reference {} -> {}",
                self.affected,
                display_ref(left.as_ref()),
                display_ref(right.as_ref())
            ),
            ChangeKind::ListChange { property, changes }
            | ChangeKind::ArrayChange { property, changes } => {
                write!(f, "{}.{property}:", self.affected)?;
                for change in changes {
                    match change {
                        ElementChange::ValueAdded { index, value } => {
                            write!(f, " +[{index}] {value}")?
                        }
                        ElementChange::ValueRemoved { index, value } => {
                            write!(f, " -[{index}] {value}")?
                        }
                        ElementChange::ElementValueChange { index, left, right } => {
                            write!(f, " [{index}] {left} -> {right}")?
                        }
                    }
                }
                Ok(())
            }
            ChangeKind::SetChange {
                property,
                added,
                removed,
            } => write!(
                f,
                "{}.{property}: added {}, removed {}",
                self.affected,
                added.len(),
                removed.len()
            ),
            ChangeKind::MapChange {
                property,
                added,
                removed,
                changed,
            } => write!(
                f,
                "{}.{property}: added {}, removed {}, changed {}",
                self.affected,
                added.len(),
                removed.len(),
                changed.len()
            ),
        }
    }
}

fn display_ref(id: Option<&GlobalId>) -> String {
    id.map_or_else(|| "null".to_string(), |id| id.to_string())
}
