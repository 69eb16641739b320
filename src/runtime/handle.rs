use std::collections::BTreeMap;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    commit::{CdoSnapshot, Commit},
    graph::global_id::GlobalId,
    log::{CdoError, CdoLog},
    object::{ObjRef, ObjectHeap},
    persist::SnapshotQuery,
    shadow::{Shadow, ShadowScope, VersionSelector},
};

use super::events::AuditEvent;

/// Failure reported through an [`AuditHandle`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The audit log rejected the request.
    #[error(transparent)]
    Log(#[from] CdoError),
    /// The runtime loop is gone.
    #[error("audit runtime channel closed")]
    ChannelClosed,
    /// The storage task panicked or was cancelled; the loop keeps serving.
    #[error("audit task failed: {0}")]
    TaskFailed(String),
}

/// Sizing of the runtime channels.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Pending commands before senders wait.
    pub command_queue_bound: usize,
    /// Events buffered per slow subscriber.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_capacity: 1024,
        }
    }
}

/// Cloneable front end of the single-writer loop. Every commit sent through
/// any clone is applied in arrival order.
#[derive(Clone)]
pub struct AuditHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<AuditEvent>,
}

enum Command {
    Commit {
        author: String,
        properties: BTreeMap<String, String>,
        heap: ObjectHeap,
        roots: Vec<ObjRef>,
        resp: oneshot::Sender<Result<Commit, RuntimeError>>,
    },
    Delete {
        author: String,
        id: GlobalId,
        resp: oneshot::Sender<Result<Commit, RuntimeError>>,
    },
    Shadow {
        id: GlobalId,
        selector: VersionSelector,
        scope: ShadowScope,
        resp: oneshot::Sender<Result<Shadow, RuntimeError>>,
    },
    Snapshots {
        id: GlobalId,
        query: SnapshotQuery,
        resp: oneshot::Sender<Result<Vec<CdoSnapshot>, RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Spawns the runtime loop owning `log`.
pub fn spawn_auditor(log: CdoLog, config: RuntimeConfig) -> AuditHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<AuditEvent>(config.event_capacity.max(1));

    let events_tx_loop = events_tx.clone();
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            if handle_command(cmd, &log, &events_tx_loop).await {
                break;
            }
        }
        debug!("audit runtime stopped");
    });

    AuditHandle { cmd_tx, events_tx }
}

impl AuditHandle {
    /// Subscribes to persisted commit events.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.events_tx.subscribe()
    }

    /// Commits the graph under `roots`; the heap is moved into the loop.
    pub async fn commit(
        &self,
        author: impl Into<String>,
        heap: ObjectHeap,
        roots: Vec<ObjRef>,
    ) -> Result<Commit, RuntimeError> {
        self.commit_with_properties(author, BTreeMap::new(), heap, roots)
            .await
    }

    /// Commits with commit properties attached.
    pub async fn commit_with_properties(
        &self,
        author: impl Into<String>,
        properties: BTreeMap<String, String>,
        heap: ObjectHeap,
        roots: Vec<ObjRef>,
    ) -> Result<Commit, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Commit {
                author: author.into(),
                properties,
                heap,
                roots,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Terminates `id` and the ValueObjects it owns.
    pub async fn shallow_delete(
        &self,
        author: impl Into<String>,
        id: GlobalId,
    ) -> Result<Commit, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Delete {
                author: author.into(),
                id,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Shadow of `id` at `selector`.
    pub async fn shadow(
        &self,
        id: GlobalId,
        selector: VersionSelector,
        scope: ShadowScope,
    ) -> Result<Shadow, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shadow {
                id,
                selector,
                scope,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Snapshots of `id`, newest first.
    pub async fn snapshots_of(
        &self,
        id: GlobalId,
        query: SnapshotQuery,
    ) -> Result<Vec<CdoSnapshot>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Snapshots {
                id,
                query,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Stops the loop after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn blocking<T, F>(log: &CdoLog, work: F) -> Result<T, RuntimeError>
where
    T: Send + 'static,
    F: FnOnce(CdoLog) -> Result<T, CdoError> + Send + 'static,
{
    let log = log.clone();
    tokio::task::spawn_blocking(move || work(log))
        .await
        .map_err(|err| {
            warn!(error = %err, "audit task failed");
            RuntimeError::TaskFailed(err.to_string())
        })?
        .map_err(RuntimeError::from)
}

async fn handle_command(cmd: Command, log: &CdoLog, events_tx: &broadcast::Sender<AuditEvent>) -> bool {
    match cmd {
        Command::Commit {
            author,
            properties,
            heap,
            roots,
            resp,
        } => {
            let res = blocking(log, move |log| {
                log.commit_with_properties(&author, properties, &heap, &roots)
            })
            .await;
            if let Ok(commit) = &res {
                if !commit.is_empty() {
                    let _ = events_tx.send(AuditEvent::Committed {
                        commit_id: commit.id(),
                        author: commit.metadata().author.clone(),
                        snapshots: commit.snapshots().len(),
                    });
                }
            }
            let _ = resp.send(res);
        }
        Command::Delete { author, id, resp } => {
            let target = id.clone();
            let res = blocking(log, move |log| log.commit_shallow_delete_by_id(&author, &id)).await;
            if let Ok(commit) = &res {
                let _ = events_tx.send(AuditEvent::Deleted {
                    global_id: target,
                    commit_id: commit.id(),
                });
            }
            let _ = resp.send(res);
        }
        Command::Shadow {
            id,
            selector,
            scope,
            resp,
        } => {
            let res = blocking(log, move |log| log.shadow_with_scope(&id, selector, scope)).await;
            let _ = resp.send(res);
        }
        Command::Snapshots { id, query, resp } => {
            let res = blocking(log, move |log| log.snapshots_of(&id, &query)).await;
            let _ = resp.send(res);
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}
