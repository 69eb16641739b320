//! Resolves declarations into managed types and property types.
//!
//! The table is computed once in [`TypeMapper::new`] and never mutated
//! afterwards; every graph build and diff reads it through a shared
//! reference.

use std::{fmt, sync::Arc};

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use super::{
    ConfigurationError,
    registry::{
        ClassDefinition, CustomComparator, EntityDefinition, PropertyDecl, TypeRef,
        TypeRegistry, ValueComparator, ValueObjectDefinition,
    },
};
use crate::types::Scalar;

const BUILTIN_VALUES: [&str; 4] = ["bool", "int", "float", "string"];

/// Kind of object node a managed class produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedKind {
    /// Globally identified by type name and identity value.
    Entity,
    /// Identified by owner GlobalId and property path.
    ValueObject,
}

/// Mapped, non-ignored property of a managed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    name: String,
    type_ref: TypeRef,
}

impl Property {
    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }
}

/// Classified Entity or ValueObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedType {
    class: String,
    type_name: String,
    kind: ManagedKind,
    id_property: Option<String>,
    properties: Vec<Property>,
}

impl ManagedType {
    /// Runtime class identifier.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Display type name used in GlobalIds and snapshots.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Entity or ValueObject.
    pub fn kind(&self) -> ManagedKind {
        self.kind
    }

    /// True for Entities.
    pub fn is_entity(&self) -> bool {
        self.kind == ManagedKind::Entity
    }

    /// Identity property of an Entity.
    pub fn id_property(&self) -> Option<&str> {
        self.id_property.as_deref()
    }

    /// Mapped properties in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Mapped property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Value type with its equality and printing rules.
#[derive(Clone)]
pub struct ValueType {
    name: String,
    comparator: Option<Arc<dyn ValueComparator>>,
}

impl ValueType {
    fn native(name: &str) -> Self {
        Self {
            name: name.to_string(),
            comparator: None,
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered equality, native equality otherwise.
    pub fn equals(&self, left: &Scalar, right: &Scalar) -> bool {
        match &self.comparator {
            Some(cmp) => cmp.equals(left, right),
            None => left == right,
        }
    }

    /// Registered printable form, native string form otherwise.
    pub fn display(&self, value: &Scalar) -> String {
        match &self.comparator {
            Some(cmp) => cmp.to_display(value),
            None => value.to_string(),
        }
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueType")
            .field("name", &self.name)
            .field("custom_comparator", &self.comparator.is_some())
            .finish()
    }
}

/// Container sub-classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Ordered sequence.
    List,
    /// Unordered collection.
    Set,
    /// Key-value map.
    Map,
    /// Fixed-length array.
    Array,
}

/// Classified container property.
#[derive(Debug, Clone)]
pub struct ContainerType {
    kind: ContainerKind,
    item: Box<PropertyType>,
    key: Option<Box<PropertyType>>,
}

impl ContainerType {
    /// Container sub-kind.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Element type, or map value type.
    pub fn item(&self) -> &PropertyType {
        &self.item
    }

    /// Map key type.
    pub fn key(&self) -> Option<&PropertyType> {
        self.key.as_deref()
    }

    /// Container of unknown elements, inferred from captured data.
    pub(crate) fn inferred(kind: ContainerKind) -> Self {
        let unknown = || Box::new(PropertyType::Unknown(String::new()));
        Self {
            kind,
            item: unknown(),
            key: (kind == ContainerKind::Map).then(unknown),
        }
    }
}

/// Classification of a declared property type.
#[derive(Clone)]
pub enum PropertyType {
    /// Equality-compared leaf.
    Value(ValueType),
    /// Reference to an Entity or ValueObject.
    Reference(ManagedKind),
    /// List, set, map or array.
    Container(ContainerType),
    /// Custom-compared type.
    Custom(Arc<dyn CustomComparator>),
    /// Skipped entirely.
    Ignored,
    /// Not registered; compared as a Value with native equality.
    Unknown(String),
}

impl fmt::Debug for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Reference(k) => f.debug_tuple("Reference").field(k).finish(),
            Self::Container(c) => f.debug_tuple("Container").field(c).finish(),
            Self::Custom(_) => f.write_str("Custom"),
            Self::Ignored => f.write_str("Ignored"),
            Self::Unknown(n) => f.debug_tuple("Unknown").field(n).finish(),
        }
    }
}

impl PropertyType {
    /// True for [`PropertyType::Ignored`].
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }

    /// Container classification, if any.
    pub fn as_container(&self) -> Option<&ContainerType> {
        match self {
            Self::Container(c) => Some(c),
            _ => None,
        }
    }
}

/// Immutable, queryable type table.
#[derive(Default)]
pub struct TypeMapper {
    managed: HashMap<String, Arc<ManagedType>>,
    by_type_name: HashMap<String, Arc<ManagedType>>,
    values: HashMap<String, ValueType>,
    custom: HashMap<String, Arc<dyn CustomComparator>>,
    ignored: HashSet<String>,
}

impl fmt::Debug for TypeMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMapper")
            .field("managed", &self.managed.len())
            .field("values", &self.values.len())
            .field("custom", &self.custom.len())
            .field("ignored", &self.ignored.len())
            .finish()
    }
}

impl TypeMapper {
    /// Classifies every declaration in `registry`.
    pub fn new(registry: &TypeRegistry) -> Result<Self, ConfigurationError> {
        let mut mapper = Self::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for definition in registry.definitions() {
            if !seen.insert(definition.class()) {
                return Err(ConfigurationError::DuplicateClass {
                    class: definition.class().to_string(),
                });
            }

            match definition {
                ClassDefinition::Entity(def) => mapper.add_managed(classify_entity(def)?)?,
                ClassDefinition::ValueObject(def) => {
                    mapper.add_managed(classify_value_object(def))?
                }
                ClassDefinition::Value(def) => {
                    mapper.values.insert(
                        def.class.clone(),
                        ValueType {
                            name: def.class.clone(),
                            comparator: def.comparator.clone(),
                        },
                    );
                }
                ClassDefinition::Ignored { class } => {
                    mapper.ignored.insert(class.clone());
                }
                ClassDefinition::Custom(def) => {
                    mapper
                        .custom
                        .insert(def.class.clone(), Arc::clone(&def.comparator));
                }
            }
        }

        mapper.check_identity_types()?;
        debug!(
            managed = mapper.managed.len(),
            values = mapper.values.len(),
            "type table classified"
        );
        Ok(mapper)
    }

    /// Managed type of a runtime class.
    pub fn managed_type(&self, class: &str) -> Result<&Arc<ManagedType>, ConfigurationError> {
        if let Some(t) = self.managed.get(class) {
            return Ok(t);
        }
        if self.values.contains_key(class)
            || self.custom.contains_key(class)
            || self.ignored.contains(class)
            || BUILTIN_VALUES.contains(&class)
        {
            return Err(ConfigurationError::NotManaged {
                class: class.to_string(),
            });
        }
        Err(ConfigurationError::UnregisteredClass {
            class: class.to_string(),
        })
    }

    /// Managed type by display type name, as stored in snapshots.
    pub fn managed_type_by_name(&self, type_name: &str) -> Option<&Arc<ManagedType>> {
        self.by_type_name.get(type_name)
    }

    /// True when instances of `class` are skipped.
    pub fn is_ignored_class(&self, class: &str) -> bool {
        self.ignored.contains(class)
    }

    /// Classifies a declared property type.
    pub fn classify(&self, type_ref: &TypeRef) -> PropertyType {
        match type_ref {
            TypeRef::Named(name) => self.classify_named(name),
            TypeRef::List(item) => self.container(ContainerKind::List, item, None),
            TypeRef::Set(item) => self.container(ContainerKind::Set, item, None),
            TypeRef::Array(item) => self.container(ContainerKind::Array, item, None),
            TypeRef::Map(key, value) => self.container(ContainerKind::Map, value, Some(key)),
        }
    }

    fn classify_named(&self, name: &str) -> PropertyType {
        if BUILTIN_VALUES.contains(&name) {
            return PropertyType::Value(ValueType::native(name));
        }
        if let Some(v) = self.values.get(name) {
            return PropertyType::Value(v.clone());
        }
        if let Some(m) = self.managed.get(name) {
            return PropertyType::Reference(m.kind);
        }
        if let Some(c) = self.custom.get(name) {
            return PropertyType::Custom(Arc::clone(c));
        }
        if self.ignored.contains(name) {
            return PropertyType::Ignored;
        }
        PropertyType::Unknown(name.to_string())
    }

    fn container(&self, kind: ContainerKind, item: &TypeRef, key: Option<&TypeRef>) -> PropertyType {
        PropertyType::Container(ContainerType {
            kind,
            item: Box::new(self.classify(item)),
            key: key.map(|k| Box::new(self.classify(k))),
        })
    }

    fn add_managed(&mut self, managed: ManagedType) -> Result<(), ConfigurationError> {
        if let Some(existing) = self.by_type_name.get(&managed.type_name) {
            return Err(ConfigurationError::DuplicateTypeName {
                type_name: managed.type_name.clone(),
                first: existing.class.clone(),
                second: managed.class.clone(),
            });
        }
        let managed = Arc::new(managed);
        self.by_type_name
            .insert(managed.type_name.clone(), Arc::clone(&managed));
        self.managed.insert(managed.class.clone(), managed);
        Ok(())
    }

    fn check_identity_types(&self) -> Result<(), ConfigurationError> {
        for managed in self.managed.values() {
            let Some(id) = managed.id_property() else {
                continue;
            };
            let Some(prop) = managed.property(id) else {
                continue;
            };
            match self.classify(prop.type_ref()) {
                PropertyType::Value(_) | PropertyType::Unknown(_) => {}
                _ => {
                    return Err(ConfigurationError::NonScalarIdProperty {
                        class: managed.class.clone(),
                        property: id.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn mapped_properties(decls: &[PropertyDecl], ignored: &[String]) -> Vec<Property> {
    decls
        .iter()
        .filter(|d| !d.ignored && !ignored.iter().any(|i| i == &d.name))
        .map(|d| Property {
            name: d.name.clone(),
            type_ref: d.type_ref.clone(),
        })
        .collect()
}

fn classify_entity(def: &EntityDefinition) -> Result<ManagedType, ConfigurationError> {
    let properties = mapped_properties(&def.properties, &def.ignored_properties);

    let id_property = match &def.id_property {
        Some(named) => named.clone(),
        None => {
            let flagged: Vec<String> = def
                .properties
                .iter()
                .filter(|p| p.id)
                .map(|p| p.name.clone())
                .collect();
            match flagged.len() {
                0 => {
                    return Err(ConfigurationError::MissingIdProperty {
                        class: def.class.clone(),
                    });
                }
                1 => flagged[0].clone(),
                _ => {
                    return Err(ConfigurationError::AmbiguousIdProperty {
                        class: def.class.clone(),
                        candidates: flagged,
                    });
                }
            }
        }
    };

    if !properties.iter().any(|p| p.name == id_property) {
        return Err(ConfigurationError::UnknownIdProperty {
            class: def.class.clone(),
            property: id_property,
        });
    }

    Ok(ManagedType {
        class: def.class.clone(),
        type_name: def.type_name.clone().unwrap_or_else(|| def.class.clone()),
        kind: ManagedKind::Entity,
        id_property: Some(id_property),
        properties,
    })
}

fn classify_value_object(def: &ValueObjectDefinition) -> ManagedType {
    ManagedType {
        class: def.class.clone(),
        type_name: def.type_name.clone().unwrap_or_else(|| def.class.clone()),
        kind: ManagedKind::ValueObject,
        id_property: None,
        properties: mapped_properties(&def.properties, &def.ignored_properties),
    }
}
