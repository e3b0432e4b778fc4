//! Connection bootstrap for the record store.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`, a 5s busy timeout and a
//!   current schema.

use super::migrations::{apply_migrations, schema_version};
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) a record store file.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    prepare("file", Connection::open(path).map_err(Into::into))
}

/// Opens a private in-memory record store.
pub fn open_db_in_memory() -> DbResult<Connection> {
    prepare("memory", Connection::open_in_memory().map_err(Into::into))
}

fn prepare(mode: &'static str, opened: DbResult<Connection>) -> DbResult<Connection> {
    let started_at = Instant::now();
    let result = opened.and_then(|mut conn| {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        apply_migrations(&mut conn)?;
        Ok(conn)
    });
    match &result {
        Ok(conn) => info!(
            "event=db_open module=db status=ok mode={} schema_version={} duration_ms={}",
            mode,
            schema_version(conn).unwrap_or_default(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={} duration_ms={} error={}",
            mode,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::{open_db, open_db_in_memory};
    use crate::db::migrations::{latest_version, schema_version};
    use tempfile::TempDir;

    #[test]
    fn in_memory_store_is_ready() {
        let conn = open_db_in_memory().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest_version());
        let fk: bool = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert!(fk);
    }

    #[test]
    fn reopening_a_file_keeps_its_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.sqlite3");
        drop(open_db(&path).unwrap());
        let conn = open_db(&path).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest_version());
    }
}
