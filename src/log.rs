//! Audit log facade: classify, build, diff, commit and shadow through one
//! configured entry point.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    commit::{
        CdoSnapshot, Commit, CommitMetadata,
        factory::CommitFactory,
        id::{
            CommitIdGenerator, CommitIdScheme, CommitSequence, RandomGenerator, SequenceGenerator,
        },
    },
    config::CoreConfig,
    diff::{Diff, DiffEngine, ListCompareAlgorithm},
    graph::{GraphError, builder::GraphBuilder, global_id::GlobalId, node::ObjectGraph},
    metadata::{
        ConfigurationError,
        classifier::TypeMapper,
        registry::{ClassDefinition, TypeRegistry},
    },
    object::{ObjRef, ObjectHeap},
    persist::{Repository, RepositoryError, SnapshotQuery, memory::InMemoryRepository},
    shadow::{Shadow, ShadowError, ShadowMaterializer, ShadowScope, VersionSelector},
    types::CommitId,
};

/// Crate-level failure.
#[derive(Debug, Error)]
pub enum CdoError {
    /// Type declarations are inconsistent or a class is not registered.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A live graph could not be traversed.
    #[error(transparent)]
    Graph(GraphError),
    /// Persistence failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// No applicable snapshot.
    #[error("not found: {0}")]
    NotFound(String),
    /// A commit selector names a commit that was never stored.
    #[error("unknown commit {0}")]
    UnknownCommit(CommitId),
}

impl From<GraphError> for CdoError {
    fn from(value: GraphError) -> Self {
        match value {
            GraphError::Configuration(err) => Self::Configuration(err),
            other => Self::Graph(other),
        }
    }
}

impl From<ShadowError> for CdoError {
    fn from(value: ShadowError) -> Self {
        match value {
            ShadowError::NotFound(id) => Self::NotFound(id),
            ShadowError::UnknownCommit(id) => Self::UnknownCommit(id),
            ShadowError::Repository(err) => Self::Repository(err),
        }
    }
}

/// Configured audit log. Cheap to clone; clones share the type table,
/// repository, id generator and clock.
#[derive(Clone)]
pub struct CdoLog {
    config: CoreConfig,
    types: Arc<TypeMapper>,
    repository: Arc<dyn Repository>,
    commit_ids: Arc<dyn CommitIdGenerator>,
    sequence: Arc<CommitSequence>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CdoLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdoLog")
            .field("config", &self.config)
            .field("types", &self.types)
            .field("commit_ids", &self.commit_ids.scheme())
            .finish_non_exhaustive()
    }
}

impl CdoLog {
    /// Starts a builder with default configuration.
    pub fn builder() -> CdoLogBuilder {
        CdoLogBuilder::default()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Classified type table.
    pub fn types(&self) -> &TypeMapper {
        &self.types
    }

    /// Backing repository.
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Captures the graph reachable from `roots`.
    pub fn build_graph(&self, heap: &ObjectHeap, roots: &[ObjRef]) -> Result<ObjectGraph, CdoError> {
        Ok(GraphBuilder::new(&self.types).build(heap, roots)?)
    }

    /// GlobalId of `obj` as a root.
    pub fn global_id_of(&self, heap: &ObjectHeap, obj: ObjRef) -> Result<GlobalId, CdoError> {
        Ok(GraphBuilder::new(&self.types).global_id_of(heap, obj)?)
    }

    /// Diff between two live graphs.
    pub fn compare(
        &self,
        old_heap: &ObjectHeap,
        old_root: ObjRef,
        new_heap: &ObjectHeap,
        new_root: ObjRef,
    ) -> Result<Diff, CdoError> {
        let old = self.build_graph(old_heap, &[old_root])?;
        let new = self.build_graph(new_heap, &[new_root])?;
        Ok(self.compare_graphs(&old, &new))
    }

    /// Diff between two captured graphs.
    pub fn compare_graphs(&self, old: &ObjectGraph, new: &ObjectGraph) -> Diff {
        DiffEngine::new(&self.types, self.config.diff_options()).diff(old, new)
    }

    /// Records the current state of the graph under `roots`.
    pub fn commit(&self, author: &str, heap: &ObjectHeap, roots: &[ObjRef]) -> Result<Commit, CdoError> {
        self.commit_with_properties(author, BTreeMap::new(), heap, roots)
    }

    /// Like [`CdoLog::commit`], attaching commit properties.
    pub fn commit_with_properties(
        &self,
        author: &str,
        properties: BTreeMap<String, String>,
        heap: &ObjectHeap,
        roots: &[ObjRef],
    ) -> Result<Commit, CdoError> {
        let started = Instant::now();
        let current = self.build_graph(heap, roots)?;
        let metadata = self.next_metadata(author, properties);
        let commit = self.factory().create(metadata, &current)?;
        if commit.is_empty() {
            warn!(commit = %commit.id(), author, "nothing changed, commit not persisted");
            return Ok(commit);
        }
        self.persist(&commit, started)?;
        Ok(commit)
    }

    /// Terminates the object rooted at `root` without touching what it
    /// references.
    pub fn commit_shallow_delete(
        &self,
        author: &str,
        heap: &ObjectHeap,
        root: ObjRef,
    ) -> Result<Commit, CdoError> {
        let id = self.global_id_of(heap, root)?;
        self.commit_shallow_delete_by_id(author, &id)
    }

    /// Terminates `id` and the ValueObjects it owns.
    pub fn commit_shallow_delete_by_id(&self, author: &str, id: &GlobalId) -> Result<Commit, CdoError> {
        let started = Instant::now();
        let metadata = self.next_metadata(author, BTreeMap::new());
        let Some(commit) = self.factory().terminate(metadata, id)? else {
            warn!(global_id = %id, "shallow delete of an object without live snapshot");
            return Err(CdoError::NotFound(id.to_string()));
        };
        self.persist(&commit, started)?;
        Ok(commit)
    }

    /// Newest snapshot of `id`, terminal ones included.
    pub fn latest_snapshot(&self, id: &GlobalId) -> Result<Option<CdoSnapshot>, CdoError> {
        Ok(self.repository.latest_snapshot(id)?)
    }

    /// Snapshots of `id`, newest first.
    pub fn snapshots_of(&self, id: &GlobalId, query: &SnapshotQuery) -> Result<Vec<CdoSnapshot>, CdoError> {
        Ok(self.repository.snapshots_of(id, query)?)
    }

    /// Deep shadow of `id` at `selector`.
    pub fn shadow(&self, id: &GlobalId, selector: VersionSelector) -> Result<Shadow, CdoError> {
        self.shadow_with_scope(id, selector, ShadowScope::Deep)
    }

    /// Shadow of `id` at `selector`, following references as far as `scope`.
    pub fn shadow_with_scope(
        &self,
        id: &GlobalId,
        selector: VersionSelector,
        scope: ShadowScope,
    ) -> Result<Shadow, CdoError> {
        let materializer =
            ShadowMaterializer::new(&self.types, self.repository.as_ref(), self.commit_ids.scheme());
        Ok(materializer.materialize(id, selector, scope)?)
    }

    fn factory(&self) -> CommitFactory<'_> {
        CommitFactory::new(&self.types, self.repository.as_ref(), self.config.diff_options())
    }

    fn next_metadata(&self, author: &str, properties: BTreeMap<String, String>) -> CommitMetadata {
        CommitMetadata {
            id: self.commit_ids.next_id(),
            author: author.to_string(),
            timestamp_ms: self.clock.now_ms(),
            sequence: self.sequence.next_value(),
            properties,
        }
    }

    fn persist(&self, commit: &Commit, started: Instant) -> Result<(), CdoError> {
        self.repository.persist(commit)?;
        info!(
            commit = %commit.id(),
            author = %commit.metadata().author,
            snapshots = commit.snapshots().len(),
            changes = commit.diff().len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "commit persisted"
        );
        if self.config.pretty_print {
            debug!("{}", commit.diff().pretty_print());
        }
        Ok(())
    }
}

/// Assembles a [`CdoLog`] from declarations, configuration, repository and
/// clock.
#[derive(Default)]
pub struct CdoLogBuilder {
    registry: TypeRegistry,
    config: CoreConfig,
    repository: Option<Arc<dyn Repository>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CdoLogBuilder {
    /// Replaces the type declarations.
    pub fn with_types(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Adds one declaration.
    pub fn register(mut self, definition: ClassDefinition) -> Self {
        self.registry = self.registry.register(definition);
        self
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Selects the list alignment strategy.
    pub fn with_list_compare_algorithm(mut self, algorithm: ListCompareAlgorithm) -> Self {
        self.config.list_compare_algorithm = algorithm;
        self
    }

    /// Selects the commit id scheme.
    pub fn with_commit_id_generator(mut self, scheme: CommitIdScheme) -> Self {
        self.config.commit_id_generator = scheme;
        self
    }

    /// Uses `repository` instead of a fresh in-memory one.
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Uses `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Classifies the declarations, prepares the repository and seeds the
    /// commit id generator from its head.
    pub fn build(self) -> Result<CdoLog, CdoError> {
        let started = Instant::now();
        let types = Arc::new(TypeMapper::new(&self.registry)?);

        let repository = match self.repository {
            Some(repo) => repo,
            None => {
                info!("no repository configured, using in-memory repository");
                Arc::new(InMemoryRepository::new()) as Arc<dyn Repository>
            }
        };
        repository.ensure_schema()?;

        let commit_ids: Arc<dyn CommitIdGenerator> = match self.config.commit_id_generator {
            CommitIdScheme::SynchronizedSequence => {
                Arc::new(SequenceGenerator::starting_after(repository.head_id()?))
            }
            CommitIdScheme::Random => Arc::new(RandomGenerator),
        };
        let sequence = Arc::new(CommitSequence::starting_after(repository.last_sequence()?));

        info!(
            list_compare_algorithm = ?self.config.list_compare_algorithm,
            commit_id_generator = ?self.config.commit_id_generator,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "audit log ready"
        );
        Ok(CdoLog {
            config: self.config,
            types,
            repository,
            commit_ids,
            sequence,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}
