//! Persistence collaborator surface.
//!
//! # Responsibility
//! - Define the commit hook invoked after every successful mutation.
//! - Define the entity records exchanged for snapshot and load.
//! - Provide a SQLite reference record store.
//!
//! # Invariants
//! - Hooks observe only committed state; a hook failure never rolls the
//!   in-memory model back.
//! - Hook failures surface as `ModelError::Backend` and are never retried.

use crate::error::BackendError;
use crate::model::entity::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

pub mod records;
pub mod sqlite;

pub use records::EntityRecord;
pub use sqlite::{CommitLogEntry, SnapshotInfo, SqliteBackend};

/// Kind of committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub operation: Operation,
    /// Affected field for updates, e.g. `"label"` or `"dimensions"`.
    pub field: Option<&'static str>,
}

/// Receives every successful mutation of a `File`.
pub trait CommitHook {
    fn on_commit(&mut self, event: &CommitEvent) -> Result<(), BackendError>;
}

/// In-memory hook that keeps every event; clones share one journal.
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    events: Arc<Mutex<Vec<CommitEvent>>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events in commit order.
    pub fn events(&self) -> Vec<CommitEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.events.lock() {
            Ok(mut events) => events.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl CommitHook for MemoryJournal {
    fn on_commit(&mut self, event: &CommitEvent) -> Result<(), BackendError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| BackendError::new("commit journal lock poisoned"))?;
        events.push(event.clone());
        Ok(())
    }
}
