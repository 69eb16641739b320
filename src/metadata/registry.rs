//! Explicit registration table: which classes are Entities, ValueObjects,
//! Values, Ignored or Custom, and how their properties map.

use std::{fmt, sync::Arc};

use crate::{graph::node::PropertyValue, types::Scalar};

/// Declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A built-in value type or a registered class.
    Named(String),
    /// Ordered sequence.
    List(Box<TypeRef>),
    /// Unordered collection.
    Set(Box<TypeRef>),
    /// Fixed-length array.
    Array(Box<TypeRef>),
    /// Key-value map.
    Map(Box<TypeRef>, Box<TypeRef>),
}

impl TypeRef {
    /// Named type.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Built-in boolean.
    pub fn bool() -> Self {
        Self::named("bool")
    }

    /// Built-in integer.
    pub fn int() -> Self {
        Self::named("int")
    }

    /// Built-in float.
    pub fn float() -> Self {
        Self::named("float")
    }

    /// Built-in string.
    pub fn string() -> Self {
        Self::named("string")
    }

    /// List of `item`.
    pub fn list(item: TypeRef) -> Self {
        Self::List(Box::new(item))
    }

    /// Set of `item`.
    pub fn set(item: TypeRef) -> Self {
        Self::Set(Box::new(item))
    }

    /// Array of `item`.
    pub fn array(item: TypeRef) -> Self {
        Self::Array(Box::new(item))
    }

    /// Map from `key` to `value`.
    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }
}

/// One declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDecl {
    /// Property name.
    pub name: String,
    /// Declared type.
    pub type_ref: TypeRef,
    /// Flags the identity property of an Entity.
    pub id: bool,
    /// Excludes the property from graphs and diffs.
    pub ignored: bool,
}

impl PropertyDecl {
    /// Plain mapped property.
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_ref,
            id: false,
            ignored: false,
        }
    }

    /// Marks this property as the identity property.
    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    /// Marks this property as ignored.
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

/// Equality and printing rules for a Value type.
pub trait ValueComparator: Send + Sync {
    /// Decides whether two values are equal.
    fn equals(&self, left: &Scalar, right: &Scalar) -> bool;

    /// Printable form attached to reported changes.
    fn to_display(&self, value: &Scalar) -> String {
        value.to_string()
    }
}

/// Equality rule for a custom, container-like type.
pub trait CustomComparator: Send + Sync {
    /// Decides whether two captured values are equal.
    fn equals(&self, left: &PropertyValue, right: &PropertyValue) -> bool;
}

/// Declaration of an Entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDefinition {
    /// Runtime class identifier.
    pub class: String,
    /// Display type name; defaults to `class`.
    pub type_name: Option<String>,
    /// Identity property; otherwise exactly one property must be flagged.
    pub id_property: Option<String>,
    /// Declared properties in declaration order.
    pub properties: Vec<PropertyDecl>,
    /// Extra property names to ignore.
    pub ignored_properties: Vec<String>,
}

impl EntityDefinition {
    /// Starts a definition for `class`.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            type_name: None,
            id_property: None,
            properties: Vec::new(),
            ignored_properties: Vec::new(),
        }
    }

    /// Overrides the display type name.
    pub fn type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    /// Names the identity property.
    pub fn id_property(mut self, name: impl Into<String>) -> Self {
        self.id_property = Some(name.into());
        self
    }

    /// Adds a property.
    pub fn property(mut self, decl: PropertyDecl) -> Self {
        self.properties.push(decl);
        self
    }

    /// Ignores a property by name.
    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignored_properties.push(name.into());
        self
    }
}

/// Declaration of a ValueObject class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueObjectDefinition {
    /// Runtime class identifier.
    pub class: String,
    /// Display type name; defaults to `class`.
    pub type_name: Option<String>,
    /// Declared properties in declaration order.
    pub properties: Vec<PropertyDecl>,
    /// Extra property names to ignore.
    pub ignored_properties: Vec<String>,
}

impl ValueObjectDefinition {
    /// Starts a definition for `class`.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            type_name: None,
            properties: Vec::new(),
            ignored_properties: Vec::new(),
        }
    }

    /// Overrides the display type name.
    pub fn type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    /// Adds a property.
    pub fn property(mut self, decl: PropertyDecl) -> Self {
        self.properties.push(decl);
        self
    }

    /// Ignores a property by name.
    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignored_properties.push(name.into());
        self
    }
}

/// Declaration of a Value class with optional custom rules.
#[derive(Clone)]
pub struct ValueDefinition {
    /// Class identifier, as used in [`TypeRef::Named`].
    pub class: String,
    /// Custom equality and printing.
    pub comparator: Option<Arc<dyn ValueComparator>>,
}

impl fmt::Debug for ValueDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueDefinition")
            .field("class", &self.class)
            .field("custom_comparator", &self.comparator.is_some())
            .finish()
    }
}

/// Declaration of a custom type compared by a registered comparator.
#[derive(Clone)]
pub struct CustomDefinition {
    /// Class identifier, as used in [`TypeRef::Named`].
    pub class: String,
    /// Comparator deciding equality.
    pub comparator: Arc<dyn CustomComparator>,
}

impl fmt::Debug for CustomDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomDefinition")
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

/// Any class declaration.
#[derive(Debug, Clone)]
pub enum ClassDefinition {
    /// Entity with global identity.
    Entity(EntityDefinition),
    /// ValueObject identified by its owner path.
    ValueObject(ValueObjectDefinition),
    /// Equality-compared leaf type.
    Value(ValueDefinition),
    /// Class whose properties are skipped.
    Ignored {
        /// Ignored class identifier.
        class: String,
    },
    /// Custom-compared type.
    Custom(CustomDefinition),
}

impl ClassDefinition {
    /// Class identifier of this declaration.
    pub fn class(&self) -> &str {
        match self {
            Self::Entity(d) => &d.class,
            Self::ValueObject(d) => &d.class,
            Self::Value(d) => &d.class,
            Self::Ignored { class } => class,
            Self::Custom(d) => &d.class,
        }
    }
}

/// Ordered collection of declarations assembled before the first diff.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    definitions: Vec<ClassDefinition>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds any declaration.
    pub fn register(mut self, definition: ClassDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Adds an Entity.
    pub fn entity(self, definition: EntityDefinition) -> Self {
        self.register(ClassDefinition::Entity(definition))
    }

    /// Adds a ValueObject.
    pub fn value_object(self, definition: ValueObjectDefinition) -> Self {
        self.register(ClassDefinition::ValueObject(definition))
    }

    /// Adds a Value compared by native equality.
    pub fn value(self, class: impl Into<String>) -> Self {
        self.register(ClassDefinition::Value(ValueDefinition {
            class: class.into(),
            comparator: None,
        }))
    }

    /// Adds a Value with custom equality and printing.
    pub fn value_with_comparator(
        self,
        class: impl Into<String>,
        comparator: Arc<dyn ValueComparator>,
    ) -> Self {
        self.register(ClassDefinition::Value(ValueDefinition {
            class: class.into(),
            comparator: Some(comparator),
        }))
    }

    /// Adds an ignored class.
    pub fn ignored(self, class: impl Into<String>) -> Self {
        self.register(ClassDefinition::Ignored {
            class: class.into(),
        })
    }

    /// Adds a custom-compared type.
    pub fn custom(self, class: impl Into<String>, comparator: Arc<dyn CustomComparator>) -> Self {
        self.register(ClassDefinition::Custom(CustomDefinition {
            class: class.into(),
            comparator,
        }))
    }

    /// All declarations in registration order.
    pub fn definitions(&self) -> &[ClassDefinition] {
        &self.definitions
    }
}
