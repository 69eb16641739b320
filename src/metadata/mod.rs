//! Type declarations and the classifier that resolves them.

/// Immutable type table built from a registry.
pub mod classifier;
/// Class declarations supplied by the caller.
pub mod registry;

use thiserror::Error;

/// Fatal misconfiguration of the declared type model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// An Entity declares no identity property.
    #[error("entity {class} has no identity property")]
    MissingIdProperty {
        /// Offending class.
        class: String,
    },
    /// An Entity declares more than one identity property.
    #[error("entity {class} has ambiguous identity properties: {candidates:?}")]
    AmbiguousIdProperty {
        /// Offending class.
        class: String,
        /// All flagged identity properties.
        candidates: Vec<String>,
    },
    /// The identity property is not a declared, mapped property.
    #[error("entity {class} names unknown identity property {property}")]
    UnknownIdProperty {
        /// Offending class.
        class: String,
        /// Named identity property.
        property: String,
    },
    /// The identity property is not declared with a scalar type.
    #[error("identity property {class}.{property} must be a scalar")]
    NonScalarIdProperty {
        /// Offending class.
        class: String,
        /// Identity property.
        property: String,
    },
    /// The same class was declared twice.
    #[error("class {class} is declared more than once")]
    DuplicateClass {
        /// Offending class.
        class: String,
    },
    /// Two classes map to the same type name, so their GlobalIds would collide.
    #[error("type name {type_name} is claimed by both {first} and {second}")]
    DuplicateTypeName {
        /// Colliding type name.
        type_name: String,
        /// Class declared first.
        first: String,
        /// Class declared second.
        second: String,
    },
    /// A live instance uses a class with no declaration.
    #[error("class {class} is not registered")]
    UnregisteredClass {
        /// Offending class.
        class: String,
    },
    /// A live instance of a Value, Custom or Ignored class was used as an object.
    #[error("class {class} is not an Entity or ValueObject")]
    NotManaged {
        /// Offending class.
        class: String,
    },
}
