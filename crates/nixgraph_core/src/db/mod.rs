//! SQLite bootstrap for the reference record store.
//!
//! # Responsibility
//! - Open connections with the pragmas the record store relies on.
//! - Bring the record schema up to date and confirm its tables exist.
//!
//! # Invariants
//! - The schema version lives in `PRAGMA user_version`.
//! - A connection handed out has every table in `REQUIRED_TABLES`.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Tables the record store reads and writes.
pub const REQUIRED_TABLES: &[&str] = &["entity_records", "commit_log", "snapshot_meta"];

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Store was written by a newer build.
    SchemaTooNew { found: u32, supported: u32 },
    /// Store reports an up-to-date version but lacks a table.
    MissingTable(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "record store schema {found} is newer than this build supports ({supported})"
            ),
            Self::MissingTable(table) => write!(f, "record store is missing table `{table}`"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
