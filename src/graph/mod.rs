//! Object graph traversal into GlobalId-keyed nodes.

/// Traversal of live heaps into [`node::ObjectGraph`]s.
pub mod builder;
/// Stable cross-version node identifiers.
pub mod global_id;
/// Captured nodes, property values and the node arena.
pub mod node;

use thiserror::Error;

use crate::metadata::ConfigurationError;

/// Failure while traversing a live graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The type model rejects the graph.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A handle points outside the heap.
    #[error("dangling object reference #{index}")]
    DanglingReference {
        /// Offending arena slot.
        index: usize,
    },
    /// An Entity instance has no identity value.
    #[error("entity {class} has a null identity")]
    NullIdentity {
        /// Entity class.
        class: String,
    },
    /// An Entity identity value is not an integer or text scalar.
    #[error("entity {class} has an unsupported identity value in {property}")]
    InvalidIdentity {
        /// Entity class.
        class: String,
        /// Identity property.
        property: String,
    },
}
