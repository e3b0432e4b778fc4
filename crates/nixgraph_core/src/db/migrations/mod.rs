//! Record store schema steps.
//!
//! # Invariants
//! - Step versions start at 1 and increase by one.
//! - All pending steps commit together or not at all.

use crate::db::{DbError, DbResult, REQUIRED_TABLES};
use log::info;
use rusqlite::Connection;

const STEPS: &[(u32, &str)] = &[
    (1, include_str!("0001_records.sql")),
    (2, include_str!("0002_snapshot_meta.sql")),
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |(version, _)| *version)
}

pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Runs every step newer than the stored version, then checks the tables.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found = schema_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    if found < supported {
        let tx = conn.transaction()?;
        for (version, sql) in STEPS.iter().filter(|(version, _)| *version > found) {
            tx.execute_batch(sql)?;
            tx.pragma_update(None, "user_version", version)?;
        }
        tx.commit()?;
        info!(
            "event=db_migrate module=db status=ok from_version={} to_version={}",
            found, supported
        );
    }
    verify_tables(conn)
}

fn verify_tables(conn: &Connection) -> DbResult<()> {
    let mut stmt =
        conn.prepare("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1;")?;
    for table in REQUIRED_TABLES {
        let count: i64 = stmt.query_row([table], |row| row.get(0))?;
        if count == 0 {
            return Err(DbError::MissingTable(*table));
        }
    }
    Ok(())
}
