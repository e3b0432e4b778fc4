//! SQLite reference record store.
//!
//! # Responsibility
//! - Append every commit event to `commit_log`.
//! - Store full snapshots as JSON entity records and load them back.
//!
//! # Invariants
//! - A snapshot replaces the previous one atomically.
//! - Load order is snapshot order; `File::load` resolves forward references.

use crate::backend::{CommitEvent, CommitHook, EntityRecord, Operation};
use crate::db::{open_db, open_db_in_memory};
use crate::error::{BackendError, ModelResult};
use crate::file::File;
use crate::model::entity::now_ms;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Row of `commit_log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitLogEntry {
    pub entity_id: Uuid,
    pub kind: String,
    pub operation: Operation,
    pub field: Option<String>,
    pub recorded_at: i64,
}

/// Row of `snapshot_meta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub file_id: Uuid,
    pub record_count: usize,
    pub saved_at: i64,
}

/// Record store over one SQLite connection; clones share the connection.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, BackendError> {
        self.conn
            .lock()
            .map_err(|_| BackendError::new("record store connection lock poisoned"))
    }

    /// Replaces the stored snapshot with `file.records()`.
    pub fn save_snapshot(&self, file: &File) -> Result<usize, BackendError> {
        let records = file.records();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM entity_records;", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entity_records (seq, entity_id, kind, payload)
                 VALUES (?1, ?2, ?3, ?4);",
            )?;
            for (seq, record) in records.iter().enumerate() {
                let payload = serde_json::to_string(record)?;
                stmt.execute(params![
                    seq as i64,
                    record.id().to_string(),
                    record.kind().as_str(),
                    payload,
                ])?;
            }
        }
        tx.execute(
            "INSERT INTO snapshot_meta (id, file_id, record_count, saved_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                file_id = excluded.file_id,
                record_count = excluded.record_count,
                saved_at = excluded.saved_at;",
            params![file.id().to_string(), records.len() as i64, now_ms()],
        )?;
        tx.commit()?;
        info!(
            "event=snapshot_save module=backend status=ok file_id={} records={}",
            file.id(),
            records.len()
        );
        Ok(records.len())
    }

    /// Summary of the stored snapshot; `None` before the first save.
    pub fn last_snapshot(&self) -> Result<Option<SnapshotInfo>, BackendError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT file_id, record_count, saved_at FROM snapshot_meta WHERE id = 1;",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((file_id, record_count, saved_at)) = row else {
            return Ok(None);
        };
        Ok(Some(SnapshotInfo {
            file_id: Uuid::parse_str(&file_id).map_err(BackendError::new)?,
            record_count: usize::try_from(record_count).map_err(BackendError::new)?,
            saved_at,
        }))
    }

    /// Reads the stored snapshot in order.
    pub fn load_records(&self) -> Result<Vec<EntityRecord>, BackendError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT payload FROM entity_records ORDER BY seq ASC;")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads {
            records.push(serde_json::from_str(&payload)?);
        }
        Ok(records)
    }

    /// Rebuilds a `File` from the stored snapshot.
    pub fn load_file(&self) -> ModelResult<File> {
        let records = self.load_records()?;
        File::load(records)
    }

    pub fn commit_log(&self) -> Result<Vec<CommitLogEntry>, BackendError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, kind, operation, field, recorded_at
             FROM commit_log
             ORDER BY seq ASC;",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (entity_id, kind, operation, field, recorded_at) in rows {
            let entity_id = Uuid::parse_str(&entity_id).map_err(BackendError::new)?;
            let operation = Operation::parse(&operation).ok_or_else(|| {
                BackendError::new(format!("unknown commit operation `{operation}`"))
            })?;
            entries.push(CommitLogEntry {
                entity_id,
                kind,
                operation,
                field,
                recorded_at,
            });
        }
        Ok(entries)
    }
}

impl CommitHook for SqliteBackend {
    fn on_commit(&mut self, event: &CommitEvent) -> Result<(), BackendError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO commit_log (entity_id, kind, operation, field, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                event.entity_id.to_string(),
                event.kind.as_str(),
                event.operation.as_str(),
                event.field,
                now_ms(),
            ],
        )?;
        debug!(
            "event=commit_log_append module=backend status=ok entity_id={} operation={}",
            event.entity_id, event.operation
        );
        Ok(())
    }
}
