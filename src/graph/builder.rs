use std::fmt::Write as _;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use super::{
    GraphError,
    global_id::{GlobalId, LocalId},
    node::{Node, ObjectGraph, PropertyMap, PropertyValue},
};
use crate::{
    metadata::classifier::{ContainerKind, ContainerType, ManagedType, TypeMapper},
    object::{Instance, ObjRef, ObjectHeap, Value},
};

const SET_HASH_LEN: usize = 16;

/// Walks live heaps into [`ObjectGraph`]s using a fixed type table.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder<'a> {
    types: &'a TypeMapper,
}

struct Pending {
    obj: ObjRef,
    id: GlobalId,
}

/// Traversal state of one build. ValueObjects are keyed by handle: the
/// first path that reaches one names it, later paths reuse that id.
#[derive(Default)]
struct Walk {
    stack: Vec<Pending>,
    value_objects: HashMap<ObjRef, GlobalId>,
}

impl<'a> GraphBuilder<'a> {
    /// Builder over `types`.
    pub fn new(types: &'a TypeMapper) -> Self {
        Self { types }
    }

    /// Captures every node reachable from `roots`.
    pub fn build(&self, heap: &ObjectHeap, roots: &[ObjRef]) -> Result<ObjectGraph, GraphError> {
        let mut walk = Walk::default();
        let mut root_ids = Vec::with_capacity(roots.len());
        for &root in roots {
            let id = self.global_id_of(heap, root)?;
            if id.is_value_object() {
                walk.value_objects.entry(root).or_insert_with(|| id.clone());
            }
            root_ids.push(id.clone());
            walk.stack.push(Pending { obj: root, id });
        }

        let mut graph = ObjectGraph::with_roots(root_ids);
        let mut visited: HashSet<GlobalId> = HashSet::new();

        while let Some(Pending { obj, id }) = walk.stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let instance = instance(heap, obj)?;
            let managed = self.types.managed_type(instance.class())?;
            let state = self.capture_state(heap, instance, managed, &id, &mut walk)?;
            graph.insert(Node::new(id, managed.type_name(), state));
        }

        debug!(nodes = graph.len(), roots = roots.len(), "object graph built");
        Ok(graph)
    }

    /// GlobalId `obj` gets when used as a root.
    pub fn global_id_of(&self, heap: &ObjectHeap, obj: ObjRef) -> Result<GlobalId, GraphError> {
        let instance = instance(heap, obj)?;
        let managed = self.types.managed_type(instance.class())?;
        if managed.is_entity() {
            entity_id(instance, managed)
        } else {
            Ok(GlobalId::unbounded(managed.type_name()))
        }
    }

    fn capture_state(
        &self,
        heap: &ObjectHeap,
        instance: &Instance,
        managed: &ManagedType,
        id: &GlobalId,
        walk: &mut Walk,
    ) -> Result<PropertyMap, GraphError> {
        let mut state = PropertyMap::new();
        for property in managed.properties() {
            let ptype = self.types.classify(property.type_ref());
            if ptype.is_ignored() {
                continue;
            }
            let Some(raw) = instance.get(property.name()) else {
                continue;
            };
            let captured = self.capture(heap, raw, ptype.as_container(), id, property.name(), walk)?;
            state.insert(property.name(), captured);
        }
        Ok(state)
    }

    fn capture(
        &self,
        heap: &ObjectHeap,
        value: &Value,
        container: Option<&ContainerType>,
        owner: &GlobalId,
        path: &str,
        walk: &mut Walk,
    ) -> Result<PropertyValue, GraphError> {
        match value {
            Value::Null => Ok(PropertyValue::Null),
            Value::Scalar(s) => Ok(PropertyValue::Scalar(s.clone())),
            Value::Ref(obj) => self.reference(heap, *obj, owner, path, walk),
            Value::Seq(items) => {
                let is_set = container.is_some_and(|c| c.kind() == ContainerKind::Set);
                let nested = container.and_then(|c| c.item().as_container());
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let fragment = if is_set && matches!(item, Value::Ref(_)) {
                        format!("{path}/{}", self.content_hash(heap, item)?)
                    } else {
                        format!("{path}/{i}")
                    };
                    out.push(self.capture(heap, item, nested, owner, &fragment, walk)?);
                }
                Ok(PropertyValue::Collection(out))
            }
            Value::Map(entries) => {
                let nested = container.and_then(|c| c.item().as_container());
                let mut out = Vec::with_capacity(entries.len());
                for (i, (k, v)) in entries.iter().enumerate() {
                    let key = self.capture(heap, k, None, owner, &format!("{path}/{i}"), walk)?;
                    let fragment = format!("{path}/{key}");
                    let value = self.capture(heap, v, nested, owner, &fragment, walk)?;
                    out.push((key, value));
                }
                Ok(PropertyValue::Map(out))
            }
        }
    }

    fn reference(
        &self,
        heap: &ObjectHeap,
        obj: ObjRef,
        owner: &GlobalId,
        path: &str,
        walk: &mut Walk,
    ) -> Result<PropertyValue, GraphError> {
        let target = instance(heap, obj)?;
        if self.types.is_ignored_class(target.class()) {
            return Ok(PropertyValue::Null);
        }
        let managed = self.types.managed_type(target.class())?;
        let id = if managed.is_entity() {
            entity_id(target, managed)?
        } else if let Some(seen) = walk.value_objects.get(&obj) {
            return Ok(PropertyValue::Ref(seen.clone()));
        } else {
            let id = owner.child(path);
            walk.value_objects.insert(obj, id.clone());
            id
        };
        walk.stack.push(Pending {
            obj,
            id: id.clone(),
        });
        Ok(PropertyValue::Ref(id))
    }

    fn content_hash(&self, heap: &ObjectHeap, value: &Value) -> Result<String, GraphError> {
        let mut content = String::new();
        let mut path = Vec::new();
        self.write_content(heap, value, &mut content, &mut path)?;
        let hash = blake3::hash(content.as_bytes());
        Ok(hash.to_hex().as_str()[..SET_HASH_LEN].to_string())
    }

    fn write_content(
        &self,
        heap: &ObjectHeap,
        value: &Value,
        out: &mut String,
        path: &mut Vec<ObjRef>,
    ) -> Result<(), GraphError> {
        match value {
            Value::Null => out.push_str("null"),
            Value::Scalar(s) => {
                let _ = write!(out, "{s:?}");
            }
            Value::Seq(items) => {
                out.push('[');
                for item in items {
                    self.write_content(heap, item, out, path)?;
                    out.push(',');
                }
                out.push(']');
            }
            Value::Map(entries) => {
                out.push('{');
                for (k, v) in entries {
                    self.write_content(heap, k, out, path)?;
                    out.push(':');
                    self.write_content(heap, v, out, path)?;
                    out.push(',');
                }
                out.push('}');
            }
            Value::Ref(obj) => {
                let target = instance(heap, *obj)?;
                if self.types.is_ignored_class(target.class()) {
                    out.push_str("null");
                    return Ok(());
                }
                let managed = self.types.managed_type(target.class())?;
                if managed.is_entity() {
                    let _ = write!(out, "@{}", entity_id(target, managed)?);
                    return Ok(());
                }
                if path.contains(obj) {
                    out.push_str("<cycle>");
                    return Ok(());
                }
                path.push(*obj);
                let _ = write!(out, "{}(", managed.type_name());
                for property in managed.properties() {
                    if let Some(v) = target.get(property.name()) {
                        let _ = write!(out, "{}=", property.name());
                        self.write_content(heap, v, out, path)?;
                        out.push(';');
                    }
                }
                out.push(')');
                path.pop();
            }
        }
        Ok(())
    }
}

fn instance(heap: &ObjectHeap, obj: ObjRef) -> Result<&Instance, GraphError> {
    heap.get(obj).ok_or(GraphError::DanglingReference { index: obj.index() })
}

fn entity_id(instance: &Instance, managed: &ManagedType) -> Result<GlobalId, GraphError> {
    let Some(id_property) = managed.id_property() else {
        return Err(GraphError::NullIdentity {
            class: managed.class().to_string(),
        });
    };
    match instance.get(id_property) {
        None | Some(Value::Null) => Err(GraphError::NullIdentity {
            class: managed.class().to_string(),
        }),
        Some(Value::Scalar(s)) => LocalId::from_scalar(s)
            .map(|local| GlobalId::instance(managed.type_name(), local))
            .ok_or_else(|| GraphError::InvalidIdentity {
                class: managed.class().to_string(),
                property: id_property.to_string(),
            }),
        Some(_) => Err(GraphError::InvalidIdentity {
            class: managed.class().to_string(),
            property: id_property.to_string(),
        }),
    }
}

