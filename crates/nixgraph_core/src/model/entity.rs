//! Identity and equality kernel.
//!
//! # Responsibility
//! - Mint entity ids and stamp creation/update times.
//! - Define the fields every named entity shares.
//! - Provide id-only equality, hashing and `Kind: {id, name}` rendering.
//!
//! # Invariants
//! - `EntityId` values are random UUIDv4 and never reused.
//! - Timestamps come from a process-wide strictly increasing clock, so
//!   `updated_at` grows on every `touch`.
//! - Two entities compare equal iff their ids are equal.

use crate::error::{ModelError, ModelResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier shared by every entity kind.
pub type EntityId = Uuid;

static LAST_STAMP_MS: AtomicI64 = AtomicI64::new(0);

static ENTITY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^/]+$").expect("valid entity name regex"));

/// Entity classification used by registries, errors and commit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Block,
    Section,
    DataArray,
    SimpleTag,
    DataTag,
    Feature,
    Source,
}

impl EntityKind {
    /// Human-readable kind name used in `to_string` renderings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Block => "Block",
            Self::Section => "Section",
            Self::DataArray => "DataArray",
            Self::SimpleTag => "SimpleTag",
            Self::DataTag => "DataTag",
            Self::Feature => "Feature",
            Self::Source => "Source",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mints a fresh entity id.
pub fn create_id() -> EntityId {
    Uuid::new_v4()
}

/// Returns whether `value` parses as an entity id.
pub fn is_valid_id(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

/// Returns a strictly increasing epoch-millisecond stamp.
///
/// Wall-clock time is used while it moves forward; otherwise the previous
/// stamp plus one.
pub fn now_ms() -> i64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0);
    let mut previous = LAST_STAMP_MS.load(Ordering::Relaxed);
    loop {
        let next = wall.max(previous + 1);
        match LAST_STAMP_MS.compare_exchange_weak(
            previous,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(actual) => previous = actual,
        }
    }
}

/// Rejects empty names, names containing `/`, and the relative path names.
pub fn validate_name(name: &str) -> ModelResult<()> {
    if name == "." || name == ".." || !ENTITY_NAME_RE.is_match(name) {
        return Err(ModelError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Fields shared by every named entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: EntityId,
    pub name: String,
    /// Serialized as `type` to match the container format's naming.
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub definition: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EntityMeta {
    /// Creates metadata with a freshly minted id.
    pub fn new(name: impl Into<String>, entity_type: Option<&str>) -> ModelResult<Self> {
        Self::with_id(create_id(), name, entity_type)
    }

    /// Creates metadata for a caller-provided id.
    ///
    /// Id collisions are the owning container's concern.
    pub fn with_id(
        id: EntityId,
        name: impl Into<String>,
        entity_type: Option<&str>,
    ) -> ModelResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        let stamp = now_ms();
        Ok(Self {
            id,
            name,
            entity_type: entity_type.map(str::to_string),
            definition: None,
            created_at: stamp,
            updated_at: stamp,
        })
    }

    /// Bumps `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        self.updated_at = now_ms().max(self.updated_at + 1);
    }
}

/// Common accessors for identity-bearing, named entities.
pub trait Entity {
    /// Kind used in registries, errors and renderings.
    const KIND: EntityKind;

    fn meta(&self) -> &EntityMeta;

    #[doc(hidden)]
    fn meta_mut(&mut self) -> &mut EntityMeta;

    fn id(&self) -> EntityId {
        self.meta().id
    }

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn entity_type(&self) -> Option<&str> {
        self.meta().entity_type.as_deref()
    }

    fn definition(&self) -> Option<&str> {
        self.meta().definition.as_deref()
    }

    fn created_at(&self) -> i64 {
        self.meta().created_at
    }

    fn updated_at(&self) -> i64 {
        self.meta().updated_at
    }

    /// Marks the entity as mutated.
    fn touch(&mut self) {
        self.meta_mut().touch();
    }
}

/// Object-safe mutable view over an entity's optional attachments.
///
/// Lets container code update names, metadata links and source lists
/// without knowing the concrete entity type.
pub(crate) trait Attachments {
    fn meta_slot(&mut self) -> &mut EntityMeta;

    fn metadata_slot(&mut self) -> Option<&mut Option<EntityId>> {
        None
    }

    fn sources_slot(&mut self) -> Option<&mut Vec<EntityId>> {
        None
    }
}

/// Implements `Entity`, id-only equality/hashing and `Kind: {id, name}`
/// rendering for a struct holding `meta: EntityMeta`.
macro_rules! impl_entity {
    ($ty:ty, $kind:expr) => {
        impl $crate::model::entity::Entity for $ty {
            const KIND: $crate::model::entity::EntityKind = $kind;

            fn meta(&self) -> &$crate::model::entity::EntityMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::model::entity::EntityMeta {
                &mut self.meta
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.meta.id == other.meta.id
            }
        }

        impl Eq for $ty {}

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.meta.id.hash(state);
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    "{}: {{id = {}, name = {}}}",
                    $kind, self.meta.id, self.meta.name
                )
            }
        }
    };
}

pub(crate) use impl_entity;

#[cfg(test)]
mod tests {
    use super::{is_valid_id, now_ms, validate_name, EntityMeta};

    #[test]
    fn clock_is_strictly_increasing() {
        let first = now_ms();
        let second = now_ms();
        assert!(second > first);
    }

    #[test]
    fn touch_moves_updated_at_forward() {
        let mut meta = EntityMeta::new("trial", Some("nix.trial")).unwrap();
        let before = meta.updated_at;
        meta.touch();
        assert!(meta.updated_at > before);
        assert_eq!(meta.created_at, before);
    }

    #[test]
    fn names_reject_separators_and_blanks() {
        assert!(validate_name("signal").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("..").is_err());
    }

    #[test]
    fn minted_ids_parse_back() {
        let meta = EntityMeta::new("x", None).unwrap();
        assert!(is_valid_id(&meta.id.to_string()));
        assert!(!is_valid_id("not-an-id"));
    }
}
