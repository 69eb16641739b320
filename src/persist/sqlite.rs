//! SQLite-backed append-only snapshot repository.

use std::{path::Path, sync::Mutex};

use rusqlite::{Connection, OptionalExtension, params, params_from_iter, types::Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CommitBound, Repository, RepositoryError, RepositoryResult, SnapshotQuery};
use crate::{
    commit::{CdoSnapshot, Commit, CommitMetadata, id::CommitIdScheme},
    graph::global_id::GlobalId,
    types::CommitId,
};

const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    snapshot: CdoSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
struct CommitEnvelope {
    format_version: u16,
    commit: CommitMetadata,
}

/// SQLite implementation of [`Repository`].
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Opens or creates a SQLite-backed repository at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite repository.
    pub fn open_in_memory() -> RepositoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> RepositoryResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.ensure_schema()?;
        Ok(repo)
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Message("connection lock poisoned".to_string()))
    }

    /// Flushes the WAL into the main database file.
    pub fn checkpoint(&self) -> RepositoryResult<()> {
        self.lock()?.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }
}

impl Repository for SqliteRepository {
    fn ensure_schema(&self) -> RepositoryResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        let has_seq: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('commits') WHERE name = 'seq'",
            [],
            |row| row.get(0),
        )?;
        if has_seq == 0 {
            conn.execute_batch("ALTER TABLE commits ADD COLUMN seq INTEGER NOT NULL DEFAULT 0;")?;
            debug!("added seq column to commits");
        }
        Ok(())
    }

    fn snapshots_of(
        &self,
        id: &GlobalId,
        query: &SnapshotQuery,
    ) -> RepositoryResult<Vec<CdoSnapshot>> {
        let mut sql = String::from(
            "SELECT s.payload FROM snapshots s \
             JOIN commits c ON c.major = s.commit_major AND c.minor = s.commit_minor \
             WHERE s.global_id = ?",
        );
        let mut args = vec![Value::Text(global_id_key(id)?)];
        if let Some(bound) = query.bound {
            push_bound(&bound, &mut sql, &mut args);
        }
        sql.push_str(" ORDER BY s.version DESC");
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            args.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| row.get::<_, Vec<u8>>(0))?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(decode_snapshot(&row?)?);
        }
        Ok(snapshots)
    }

    fn persist(&self, commit: &Commit) -> RepositoryResult<()> {
        let mut conn = self.lock()?;
        let id = commit.id();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM commits WHERE major = ?1 AND minor = ?2",
                params![id.major as i64, id.minor as i64],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(RepositoryError::DuplicateCommit(id));
        }

        let tx = conn.transaction()?;
        {
            let meta = commit.metadata();
            let payload = serde_json::to_vec(&CommitEnvelope {
                format_version: FORMAT_VERSION,
                commit: meta.clone(),
            })?;
            tx.execute(
                "INSERT INTO commits(major, minor, author, ts_ms, seq, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.major as i64,
                    id.minor as i64,
                    meta.author,
                    meta.timestamp_ms as i64,
                    meta.sequence as i64,
                    payload,
                ],
            )?;

            let mut stmt = tx.prepare(
                "INSERT INTO snapshots(global_id, version, commit_major, commit_minor, kind, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for snapshot in commit.snapshots() {
                let payload = serde_json::to_vec(&SnapshotEnvelope {
                    format_version: FORMAT_VERSION,
                    snapshot: snapshot.clone(),
                })?;
                stmt.execute(params![
                    global_id_key(&snapshot.global_id)?,
                    snapshot.version as i64,
                    id.major as i64,
                    id.minor as i64,
                    snapshot.kind.code(),
                    payload,
                ])?;
            }
        }
        tx.commit()?;
        debug!(commit = %id, snapshots = commit.snapshots().len(), "commit written to sqlite");
        Ok(())
    }

    fn head_id(&self) -> RepositoryResult<Option<CommitId>> {
        let conn = self.lock()?;
        let head: Option<(i64, i64)> = conn
            .query_row(
                "SELECT major, minor FROM commits ORDER BY major DESC, minor DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(head.map(|(major, minor)| CommitId::new(major as u64, minor as u32)))
    }

    fn last_sequence(&self) -> RepositoryResult<u64> {
        let conn = self.lock()?;
        let last: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM commits", [], |row| {
            row.get(0)
        })?;
        Ok(last as u64)
    }

    fn commit_metadata(&self, id: CommitId) -> RepositoryResult<Option<CommitMetadata>> {
        let conn = self.lock()?;
        let payload: Option<Vec<u8>> = conn
            .query_row(
                "SELECT payload FROM commits WHERE major = ?1 AND minor = ?2",
                params![id.major as i64, id.minor as i64],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let env: CommitEnvelope = serde_json::from_slice(&payload)?;
        if env.format_version != FORMAT_VERSION {
            return Err(unsupported(env.format_version));
        }
        Ok(Some(env.commit))
    }
}

/// Appends the SQL form of `bound` over the joined commit row `c`.
fn push_bound(bound: &CommitBound, sql: &mut String, args: &mut Vec<Value>) {
    match *bound {
        CommitBound::AtOrBeforeTime(ts) => {
            sql.push_str(" AND c.ts_ms <= ?");
            args.push(Value::Integer(ts as i64));
        }
        CommitBound::AtOrBefore {
            id,
            scheme: CommitIdScheme::SynchronizedSequence,
            ..
        } => {
            sql.push_str(" AND (c.major < ? OR (c.major = ? AND c.minor <= ?))");
            args.extend([
                Value::Integer(id.major as i64),
                Value::Integer(id.major as i64),
                Value::Integer(i64::from(id.minor)),
            ]);
        }
        CommitBound::AtOrBefore {
            id,
            timestamp_ms,
            sequence,
            scheme: CommitIdScheme::Random,
        } => {
            sql.push_str(
                " AND ((c.major = ? AND c.minor = ?) OR c.ts_ms < ? OR (c.ts_ms = ? AND c.seq <= ?))",
            );
            args.extend([
                Value::Integer(id.major as i64),
                Value::Integer(i64::from(id.minor)),
                Value::Integer(timestamp_ms as i64),
                Value::Integer(timestamp_ms as i64),
                Value::Integer(sequence as i64),
            ]);
        }
    }
}

fn global_id_key(id: &GlobalId) -> RepositoryResult<String> {
    Ok(serde_json::to_string(id)?)
}

fn decode_snapshot(payload: &[u8]) -> RepositoryResult<CdoSnapshot> {
    let env: SnapshotEnvelope = serde_json::from_slice(payload)?;
    if env.format_version != FORMAT_VERSION {
        return Err(unsupported(env.format_version));
    }
    Ok(env.snapshot)
}

fn unsupported(version: u16) -> RepositoryError {
    RepositoryError::Message(format!("unsupported payload format version: {version}"))
}
