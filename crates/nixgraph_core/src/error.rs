//! Error taxonomy for object-model operations.
//!
//! # Responsibility
//! - Name every way an invariant-checked operation can be rejected.
//! - Carry persistence collaborator failures through unmodified.
//!
//! # Invariants
//! - Every variant except `Backend` is produced before any mutation is
//!   applied; callers never observe a partially-mutated entity.
//! - `BackendError` is opaque and is never retried by this crate.

use crate::model::entity::{EntityId, EntityKind};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by every fallible model operation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors from object-model operations.
#[derive(Debug)]
pub enum ModelError {
    /// Referenced id does not exist.
    NotFound(EntityId),
    /// Named property is absent from the section.
    PropertyNotFound { section: EntityId, name: String },
    /// Name already used within the same uniqueness scope.
    DuplicateName { kind: EntityKind, name: String },
    /// Caller-supplied id collides with a live entity.
    DuplicateId(EntityId),
    /// Name is empty or contains a path separator.
    InvalidName(String),
    /// Vector length or rank disagrees with the geometry it is checked against.
    ShapeMismatch { expected: usize, actual: usize },
    /// Dimension descriptor does not fit its axis.
    InvalidDimension(String),
    /// Region or index leaves the bounds of an array or dimension.
    OutOfBounds(String),
    /// Dimension appended past the last axis.
    InvalidIndex { index: usize, rank: usize },
    /// Payload or element type disagreement.
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// Re-parenting would make a node its own ancestor.
    CyclicReference { node: EntityId, parent: EntityId },
    /// Section link would point at the section itself or one of its ancestors.
    InvalidLink { section: EntityId, target: EntityId },
    /// Deletion blocked by a live reference.
    ReferencedEntity { id: EntityId, referrer: EntityId },
    /// Persisted records cannot be converted into a consistent model.
    InvalidData(String),
    /// Persistence collaborator failure, surfaced unmodified.
    Backend(BackendError),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "entity not found: {id}"),
            Self::PropertyNotFound { section, name } => {
                write!(f, "property `{name}` not found in section {section}")
            }
            Self::DuplicateName { kind, name } => {
                write!(f, "{kind} named `{name}` already exists")
            }
            Self::DuplicateId(id) => write!(f, "entity id already in use: {id}"),
            Self::InvalidName(name) => write!(f, "invalid entity name `{name}`"),
            Self::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: expected {expected}, got {actual}")
            }
            Self::InvalidDimension(message) => write!(f, "invalid dimension: {message}"),
            Self::OutOfBounds(message) => write!(f, "out of bounds: {message}"),
            Self::InvalidIndex { index, rank } => {
                write!(f, "dimension index {index} exceeds array rank {rank}")
            }
            Self::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {expected}, got {actual}")
            }
            Self::CyclicReference { node, parent } => {
                write!(f, "moving {node} under {parent} would create a cycle")
            }
            Self::InvalidLink { section, target } => {
                write!(f, "section {section} cannot link to ancestor {target}")
            }
            Self::ReferencedEntity { id, referrer } => {
                write!(f, "entity {id} is still referenced by {referrer}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for ModelError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

/// Opaque failure raised by a persistence collaborator.
#[derive(Debug)]
pub struct BackendError {
    inner: Box<dyn Error + Send + Sync>,
}

impl BackendError {
    /// Wraps any collaborator error (or message) without interpreting it.
    pub fn new(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self { inner: err.into() }
    }

    /// Returns the wrapped collaborator error.
    pub fn into_inner(self) -> Box<dyn Error + Send + Sync> {
        self.inner
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "backend error: {}", self.inner)
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        Self::new(value)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(value: serde_json::Error) -> Self {
        Self::new(value)
    }
}

impl From<crate::db::DbError> for BackendError {
    fn from(value: crate::db::DbError) -> Self {
        Self::new(value)
    }
}
