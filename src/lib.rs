//! Object graph auditing: diff successive versions of live object graphs,
//! record the changes as append-only commits of snapshots, and rebuild any
//! historical version on demand.
//!
//! # Examples
//!
//! Commit two versions of an entity and read the first one back:
//! ```
//! use cdolog::{
//!     log::CdoLog,
//!     metadata::registry::{EntityDefinition, PropertyDecl, TypeRef, TypeRegistry},
//!     object::{Instance, ObjectHeap, Value},
//!     shadow::VersionSelector,
//! };
//!
//! let log = CdoLog::builder()
//!     .with_types(TypeRegistry::new().entity(
//!         EntityDefinition::new("Person")
//!             .property(PropertyDecl::new("id", TypeRef::int()).id())
//!             .property(PropertyDecl::new("name", TypeRef::string())),
//!     ))
//!     .build()
//!     .expect("valid declarations");
//!
//! let mut heap = ObjectHeap::new();
//! let ann = heap.alloc(Instance::new("Person").with("id", 1_i64).with("name", "Ann"));
//! let first = log.commit("alice", &heap, &[ann]).expect("first commit");
//!
//! heap.get_mut(ann).expect("live instance").set("name", "Anna");
//! let second = log.commit("bob", &heap, &[ann]).expect("second commit");
//! assert_eq!(second.diff().len(), 1);
//!
//! let id = log.global_id_of(&heap, ann).expect("global id");
//! let shadow = log.shadow(&id, VersionSelector::AtCommit(first.id())).expect("shadow");
//! assert_eq!(
//!     shadow.root_instance().and_then(|p| p.get("name")),
//!     Some(&Value::text("Ann"))
//! );
//! ```
//!
//! Runtime usage with a SQLite repository:
//! ```no_run
//! use std::sync::Arc;
//!
//! use cdolog::{
//!     log::CdoLog,
//!     metadata::registry::{EntityDefinition, PropertyDecl, TypeRef, TypeRegistry},
//!     object::{Instance, ObjectHeap},
//!     persist::sqlite::SqliteRepository,
//!     runtime::handle::{spawn_auditor, RuntimeConfig},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let repo = SqliteRepository::open("audit.db").expect("open sqlite");
//! let log = CdoLog::builder()
//!     .with_types(TypeRegistry::new().entity(
//!         EntityDefinition::new("Person")
//!             .property(PropertyDecl::new("id", TypeRef::int()).id()),
//!     ))
//!     .with_repository(Arc::new(repo))
//!     .build()
//!     .expect("build log");
//! let handle = spawn_auditor(log, RuntimeConfig::default());
//!
//! let mut heap = ObjectHeap::new();
//! let root = heap.alloc(Instance::new("Person").with("id", 7_i64));
//! let _commit = handle.commit("alice", heap, vec![root]).await.expect("commit");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Commit timestamp sources.
pub mod clock;
/// Commits, snapshots and commit id generators.
pub mod commit;
/// Engine configuration.
pub mod config;
/// Graph diffing and the change taxonomy.
pub mod diff;
/// Object graph capture and GlobalIds.
pub mod graph;
/// Configured audit log facade.
pub mod log;
/// Type declarations and classification.
pub mod metadata;
/// Live object arena.
pub mod object;
/// Snapshot repositories.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Historical graph reconstruction.
pub mod shadow;
/// Shared primitive types and enums.
pub mod types;
