use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use super::global_id::GlobalId;
use crate::types::Scalar;

static NULL: PropertyValue = PropertyValue::Null;

/// Captured property value of a node.
///
/// The total order (null, scalars, references, collections, maps) only
/// serves deterministic tie-breaking; it carries no domain meaning.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Absent value.
    Null,
    /// Scalar leaf.
    Scalar(Scalar),
    /// Edge to another node.
    Ref(GlobalId),
    /// List, set or array elements.
    Collection(Vec<PropertyValue>),
    /// Map entries.
    Map(Vec<(PropertyValue, PropertyValue)>),
}

impl PropertyValue {
    /// True for [`PropertyValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Referenced GlobalId, if this is an edge.
    pub fn as_reference(&self) -> Option<&GlobalId> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// Collection elements; null reads as empty.
    pub fn as_elements(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::Collection(items) => Some(items),
            Self::Null => Some(&[]),
            _ => None,
        }
    }

    /// Map entries; null reads as empty.
    pub fn as_entries(&self) -> Option<&[(PropertyValue, PropertyValue)]> {
        match self {
            Self::Map(entries) => Some(entries),
            Self::Null => Some(&[]),
            _ => None,
        }
    }

    /// Every GlobalId referenced by this value, containers included.
    pub fn references(&self) -> Vec<&GlobalId> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a GlobalId>) {
        match self {
            Self::Ref(id) => out.push(id),
            Self::Collection(items) => items.iter().for_each(|i| i.collect_references(out)),
            Self::Map(entries) => {
                for (k, v) in entries {
                    k.collect_references(out);
                    v.collect_references(out);
                }
            }
            Self::Null | Self::Scalar(_) => {}
        }
    }
}

impl From<Scalar> for PropertyValue {
    fn from(v: Scalar) -> Self {
        Self::Scalar(v)
    }
}

impl From<GlobalId> for PropertyValue {
    fn from(v: GlobalId) -> Self {
        Self::Ref(v)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Scalar(s) => write!(f, "{s}"),
            Self::Ref(id) => write!(f, "{id}"),
            Self::Collection(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Ordered property-name to value mapping. Null values are not stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyMap {
    entries: Vec<(String, PropertyValue)>,
}

impl PropertyMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`; storing null removes the entry.
    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        let name = name.into();
        let pos = self.entries.iter().position(|(n, _)| *n == name);
        match (pos, value.is_null()) {
            (Some(i), true) => {
                self.entries.remove(i);
            }
            (Some(i), false) => self.entries[i].1 = value,
            (None, true) => {}
            (None, false) => self.entries.push((name, value)),
        }
    }

    /// Value of `name`, null when absent.
    pub fn get(&self, name: &str) -> &PropertyValue {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .unwrap_or(&NULL)
    }

    /// Names with a non-null value, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of non-null properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when every property is null.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every GlobalId referenced by any property.
    pub fn references(&self) -> Vec<&GlobalId> {
        self.entries.iter().flat_map(|(_, v)| v.references()).collect()
    }
}

impl PartialEq for PropertyMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(n, v)| other.get(n) == v)
    }
}

impl FromIterator<(String, PropertyValue)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (n, v) in iter {
            map.insert(n, v);
        }
        map
    }
}

/// One traversed object; immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    global_id: GlobalId,
    type_name: String,
    state: PropertyMap,
}

impl Node {
    /// Builds a node.
    pub fn new(global_id: GlobalId, type_name: impl Into<String>, state: PropertyMap) -> Self {
        Self {
            global_id,
            type_name: type_name.into(),
            state,
        }
    }

    /// Node identity.
    pub fn global_id(&self) -> &GlobalId {
        &self.global_id
    }

    /// Managed type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Captured properties.
    pub fn state(&self) -> &PropertyMap {
        &self.state
    }

    /// Value of one property, null when absent.
    pub fn get(&self, property: &str) -> &PropertyValue {
        self.state.get(property)
    }

    pub(crate) fn state_mut(&mut self) -> &mut PropertyMap {
        &mut self.state
    }
}

/// Arena of nodes keyed and ordered by GlobalId.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectGraph {
    roots: Vec<GlobalId>,
    nodes: BTreeMap<GlobalId, Node>,
}

impl ObjectGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph with the given roots and no nodes.
    pub fn with_roots(roots: Vec<GlobalId>) -> Self {
        Self {
            roots,
            nodes: BTreeMap::new(),
        }
    }

    /// Inserts or replaces a node.
    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.global_id.clone(), node);
    }

    /// Removes a node.
    pub fn remove(&mut self, id: &GlobalId) -> Option<Node> {
        self.nodes.remove(id)
    }

    /// Node by id.
    pub fn get(&self, id: &GlobalId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &GlobalId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// True when `id` is a node of this graph.
    pub fn contains(&self, id: &GlobalId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Root ids in the order they were supplied.
    pub fn roots(&self) -> &[GlobalId] {
        &self.roots
    }

    /// Nodes in GlobalId order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Ids in GlobalId order.
    pub fn ids(&self) -> impl Iterator<Item = &GlobalId> {
        self.nodes.keys()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
