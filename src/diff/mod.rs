//! Graph comparison and the change taxonomy.

/// Typed changes and their inverses.
pub mod change;
/// List alignment strategies.
pub mod list;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    graph::{
        global_id::GlobalId,
        node::{Node, ObjectGraph, PropertyMap, PropertyValue},
    },
    metadata::classifier::{ContainerKind, ContainerType, PropertyType, TypeMapper},
};
use change::{Change, ChangeKind, ElementChange, EntryChange};

/// Strategy used to align list elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListCompareAlgorithm {
    /// Positional comparison.
    #[default]
    Simple,
    /// Minimum edit distance alignment.
    LevenshteinDistance,
}

/// Knobs of the diff engine, fixed at configuration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// List alignment strategy.
    pub list_algorithm: ListCompareAlgorithm,
    /// Report every property of a new object as a change from null.
    pub initial_changes: bool,
    /// Report every property of a removed object as a change to null.
    pub terminal_changes: bool,
}

/// Ordered changes between two graphs.
///
/// Changes are sorted by affected GlobalId; for each id the object-level
/// change comes first, followed by property changes in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    changes: Vec<Change>,
}

impl Diff {
    /// Wraps already ordered changes.
    pub fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    /// All changes in order.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// True when at least one change was found.
    pub fn has_changes(&self) -> bool {
        !self.is_empty()
    }

    /// Changes grouped by affected node.
    pub fn changes_by_object(&self) -> BTreeMap<&GlobalId, Vec<&Change>> {
        let mut grouped: BTreeMap<&GlobalId, Vec<&Change>> = BTreeMap::new();
        for change in &self.changes {
            grouped.entry(change.affected()).or_default().push(change);
        }
        grouped
    }

    /// Diff describing the reverse transition.
    pub fn inverse(&self) -> Self {
        Self {
            changes: self.changes.iter().map(Change::inverse).collect(),
        }
    }

    /// Applies every change to a copy of `graph`.
    ///
    /// New objects start empty and are filled by their property changes, so
    /// a diff computed with initial changes rebuilds new nodes completely.
    pub fn apply_to(&self, graph: &ObjectGraph) -> ObjectGraph {
        let mut out = graph.clone();
        for change in &self.changes {
            let id = change.affected();
            match change.kind() {
                ChangeKind::NewObject => {
                    if !out.contains(id) {
                        out.insert(Node::new(id.clone(), change.type_name(), PropertyMap::new()));
                    }
                }
                ChangeKind::ObjectRemoved => {
                    out.remove(id);
                }
                kind => {
                    if let Some(node) = out.get_mut(id) {
                        apply_property(node.state_mut(), kind);
                    }
                }
            }
        }
        out
    }

    /// Human readable multi-line summary.
    pub fn pretty_print(&self) -> String {
        if self.changes.is_empty() {
            return "Diff: <empty>".to_string();
        }
        let mut out = String::from("Diff:");
        for (id, changes) in self.changes_by_object() {
            out.push_str(&format!("\n* {id}"));
            for change in changes {
                out.push_str(&format!("\n  - {change}"));
            }
        }
        out
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_print())
    }
}

fn apply_property(state: &mut PropertyMap, kind: &ChangeKind) {
    match kind {
        ChangeKind::NewObject | ChangeKind::ObjectRemoved => {}
        ChangeKind::ValueChange {
            property, right, ..
        } => state.insert(property.as_str(), right.clone()),
        ChangeKind::ReferenceChange {
            property, right, ..
        } => state.insert(
            property.as_str(),
            right.clone().map_or(PropertyValue::Null, PropertyValue::Ref),
        ),
        ChangeKind::ListChange { property, changes }
        | ChangeKind::ArrayChange { property, changes } => {
            let current = state.get(property).as_elements().unwrap_or_default();
            let next = list::apply(current, changes);
            state.insert(property.as_str(), PropertyValue::Collection(next));
        }
        ChangeKind::SetChange {
            property,
            added,
            removed,
        } => {
            let mut items: Vec<PropertyValue> = state
                .get(property)
                .as_elements()
                .unwrap_or_default()
                .iter()
                .filter(|v| !removed.contains(v))
                .cloned()
                .collect();
            items.extend(added.iter().cloned());
            state.insert(property.as_str(), PropertyValue::Collection(items));
        }
        ChangeKind::MapChange {
            property,
            added,
            removed,
            changed,
        } => {
            let mut entries: Vec<(PropertyValue, PropertyValue)> = state
                .get(property)
                .as_entries()
                .unwrap_or_default()
                .iter()
                .filter(|(k, _)| !removed.iter().any(|(r, _)| r == k))
                .cloned()
                .collect();
            for EntryChange { key, right, .. } in changed {
                if let Some(entry) = entries.iter_mut().find(|(k, _)| k == key) {
                    entry.1 = right.clone();
                }
            }
            entries.extend(added.iter().cloned());
            state.insert(property.as_str(), PropertyValue::Map(entries));
        }
    }
}

/// Compares graphs node by node using a fixed type table.
#[derive(Debug, Clone, Copy)]
pub struct DiffEngine<'a> {
    types: &'a TypeMapper,
    options: DiffOptions,
}

impl<'a> DiffEngine<'a> {
    /// Engine over `types`.
    pub fn new(types: &'a TypeMapper, options: DiffOptions) -> Self {
        Self { types, options }
    }

    /// Options in effect.
    pub fn options(&self) -> DiffOptions {
        self.options
    }

    /// Changes turning `old` into `new`. Never fails and never mutates
    /// its inputs.
    pub fn diff(&self, old: &ObjectGraph, new: &ObjectGraph) -> Diff {
        let ids: BTreeSet<&GlobalId> = old.ids().chain(new.ids()).collect();
        let mut changes = Vec::new();
        for id in ids {
            match (old.get(id), new.get(id)) {
                (None, Some(node)) => {
                    changes.push(Change::new(id.clone(), node.type_name(), ChangeKind::NewObject));
                    if self.options.initial_changes {
                        self.compare_nodes(None, Some(node), &mut changes);
                    }
                }
                (Some(node), None) => {
                    changes.push(Change::new(
                        id.clone(),
                        node.type_name(),
                        ChangeKind::ObjectRemoved,
                    ));
                    if self.options.terminal_changes {
                        self.compare_nodes(Some(node), None, &mut changes);
                    }
                }
                (Some(_), Some(_)) => self.compare_nodes(old.get(id), new.get(id), &mut changes),
                (None, None) => {}
            }
        }
        debug!(
            old_nodes = old.len(),
            new_nodes = new.len(),
            changes = changes.len(),
            "graphs compared"
        );
        Diff::new(changes)
    }

    /// Property-level changes of one node pair; a missing side reads as a
    /// node whose properties are all null.
    pub fn compare_nodes(&self, old: Option<&Node>, new: Option<&Node>, out: &mut Vec<Change>) {
        let Some(any) = new.or(old) else {
            return;
        };
        let empty = PropertyMap::new();
        let left = old.map_or(&empty, Node::state);
        let right = new.map_or(&empty, Node::state);

        for (name, ptype) in self.compared_properties(old, new) {
            if let Some(kind) = self.compare_property(&name, &ptype, left.get(&name), right.get(&name)) {
                out.push(Change::new(any.global_id().clone(), any.type_name(), kind));
            }
        }
    }

    fn compared_properties(&self, old: Option<&Node>, new: Option<&Node>) -> Vec<(String, PropertyType)> {
        let lookup = |node: Option<&Node>| {
            node.and_then(|n| self.types.managed_type_by_name(n.type_name()))
        };
        let mut names: Vec<(String, PropertyType)> = Vec::new();
        let (new_type, old_type) = (lookup(new), lookup(old));
        if new_type.is_none() && old_type.is_none() {
            for node in [old, new].into_iter().flatten() {
                for name in node.state().names() {
                    if !names.iter().any(|(n, _)| n == name) {
                        names.push((name.to_string(), PropertyType::Unknown(String::new())));
                    }
                }
            }
            return names;
        }
        for managed in [new_type, old_type].into_iter().flatten() {
            for property in managed.properties() {
                if !names.iter().any(|(n, _)| n == property.name()) {
                    names.push((
                        property.name().to_string(),
                        self.types.classify(property.type_ref()),
                    ));
                }
            }
        }
        names
    }

    fn compare_property(
        &self,
        name: &str,
        ptype: &PropertyType,
        left: &PropertyValue,
        right: &PropertyValue,
    ) -> Option<ChangeKind> {
        match ptype {
            PropertyType::Ignored => None,
            PropertyType::Custom(cmp) => {
                (!cmp.equals(left, right)).then(|| value_change(name, ptype, left, right))
            }
            PropertyType::Container(container) => {
                match self.compare_container(name, container, left, right) {
                    Shape::Changed(kind) => Some(kind),
                    Shape::Unchanged => None,
                    Shape::Mismatch => self.compare_leaf(name, ptype, left, right),
                }
            }
            PropertyType::Unknown(_) => {
                let inferred = match (left, right) {
                    (PropertyValue::Collection(_), _) | (_, PropertyValue::Collection(_)) => {
                        Some(ContainerKind::List)
                    }
                    (PropertyValue::Map(_), _) | (_, PropertyValue::Map(_)) => {
                        Some(ContainerKind::Map)
                    }
                    _ => None,
                };
                match inferred {
                    Some(kind) => {
                        let container = ContainerType::inferred(kind);
                        match self.compare_container(name, &container, left, right) {
                            Shape::Changed(kind) => Some(kind),
                            Shape::Unchanged => None,
                            Shape::Mismatch => self.compare_leaf(name, ptype, left, right),
                        }
                    }
                    None => self.compare_leaf(name, ptype, left, right),
                }
            }
            PropertyType::Value(_) | PropertyType::Reference(_) => {
                self.compare_leaf(name, ptype, left, right)
            }
        }
    }

    fn compare_leaf(
        &self,
        name: &str,
        ptype: &PropertyType,
        left: &PropertyValue,
        right: &PropertyValue,
    ) -> Option<ChangeKind> {
        if values_equal(ptype, left, right) {
            return None;
        }
        let is_edge = |v: &PropertyValue| matches!(v, PropertyValue::Ref(_) | PropertyValue::Null);
        if is_edge(left) && is_edge(right) {
            return Some(ChangeKind::ReferenceChange {
                property: name.to_string(),
                left: left.as_reference().cloned(),
                right: right.as_reference().cloned(),
            });
        }
        Some(value_change(name, ptype, left, right))
    }

    fn compare_container(
        &self,
        name: &str,
        container: &ContainerType,
        left: &PropertyValue,
        right: &PropertyValue,
    ) -> Shape {
        let item = container.item();
        let eq = |a: &PropertyValue, b: &PropertyValue| values_equal(item, a, b);
        let property = name.to_string();

        let kind = match container.kind() {
            ContainerKind::List | ContainerKind::Array | ContainerKind::Set => {
                let (Some(l), Some(r)) = (left.as_elements(), right.as_elements()) else {
                    return Shape::Mismatch;
                };
                match container.kind() {
                    ContainerKind::List => {
                        let changes = match self.options.list_algorithm {
                            ListCompareAlgorithm::Simple => list::simple(l, r, eq),
                            ListCompareAlgorithm::LevenshteinDistance => {
                                list::levenshtein(l, r, eq)
                            }
                        };
                        if changes.is_empty() {
                            return Shape::Unchanged;
                        }
                        ChangeKind::ListChange { property, changes }
                    }
                    ContainerKind::Array => {
                        let changes: Vec<ElementChange> = list::simple(l, r, eq);
                        if changes.is_empty() {
                            return Shape::Unchanged;
                        }
                        ChangeKind::ArrayChange { property, changes }
                    }
                    _ => {
                        let added: Vec<PropertyValue> = r
                            .iter()
                            .filter(|x| !l.iter().any(|y| eq(y, x)))
                            .cloned()
                            .collect();
                        let removed: Vec<PropertyValue> = l
                            .iter()
                            .filter(|x| !r.iter().any(|y| eq(x, y)))
                            .cloned()
                            .collect();
                        if added.is_empty() && removed.is_empty() {
                            return Shape::Unchanged;
                        }
                        ChangeKind::SetChange {
                            property,
                            added,
                            removed,
                        }
                    }
                }
            }
            ContainerKind::Map => {
                let (Some(l), Some(r)) = (left.as_entries(), right.as_entries()) else {
                    return Shape::Mismatch;
                };
                let lookup = |entries: &[(PropertyValue, PropertyValue)], key: &PropertyValue| {
                    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
                };
                let mut added: Vec<(PropertyValue, PropertyValue)> = r
                    .iter()
                    .filter(|(k, _)| lookup(l, k).is_none())
                    .cloned()
                    .collect();
                let mut removed: Vec<(PropertyValue, PropertyValue)> = l
                    .iter()
                    .filter(|(k, _)| lookup(r, k).is_none())
                    .cloned()
                    .collect();
                let mut changed: Vec<EntryChange> = l
                    .iter()
                    .filter_map(|(k, lv)| {
                        let rv = lookup(r, k)?;
                        (!eq(lv, &rv)).then(|| EntryChange {
                            key: k.clone(),
                            left: lv.clone(),
                            right: rv,
                        })
                    })
                    .collect();
                if added.is_empty() && removed.is_empty() && changed.is_empty() {
                    return Shape::Unchanged;
                }
                added.sort_by_key(|(k, _)| k.to_string());
                removed.sort_by_key(|(k, _)| k.to_string());
                changed.sort_by_key(|c| c.key.to_string());
                ChangeKind::MapChange {
                    property,
                    added,
                    removed,
                    changed,
                }
            }
        };
        Shape::Changed(kind)
    }
}

enum Shape {
    Changed(ChangeKind),
    Unchanged,
    Mismatch,
}

fn values_equal(ptype: &PropertyType, left: &PropertyValue, right: &PropertyValue) -> bool {
    match (ptype, left, right) {
        (PropertyType::Value(vt), PropertyValue::Scalar(a), PropertyValue::Scalar(b)) => {
            vt.equals(a, b)
        }
        (PropertyType::Custom(cmp), _, _) => cmp.equals(left, right),
        _ => left == right,
    }
}

fn display(ptype: &PropertyType, value: &PropertyValue) -> String {
    match (ptype, value) {
        (PropertyType::Value(vt), PropertyValue::Scalar(s)) => vt.display(s),
        _ => value.to_string(),
    }
}

fn value_change(
    name: &str,
    ptype: &PropertyType,
    left: &PropertyValue,
    right: &PropertyValue,
) -> ChangeKind {
    ChangeKind::ValueChange {
        property: name.to_string(),
        left: left.clone(),
        right: right.clone(),
        left_display: display(ptype, left),
        right_display: display(ptype, right),
    }
}
