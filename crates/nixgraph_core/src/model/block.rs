//! Per-dataset ownership container.
//!
//! # Invariants
//! - Data arrays, simple tags and data tags are name-unique per kind.
//! - Owned sources form an acyclic tree with sibling-unique names.
//! - `source_refs` only references sources; it never owns them.

use crate::error::ModelResult;
use crate::model::data_array::DataArray;
use crate::model::entity::{impl_entity, Attachments, EntityId, EntityKind, EntityMeta};
use crate::model::source::Source;
use crate::model::tag::{DataTag, SimpleTag};
use crate::store::{Collection, Forest};

#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) meta: EntityMeta,
    pub(crate) metadata: Option<EntityId>,
    pub(crate) source_refs: Vec<EntityId>,
    pub(crate) data_arrays: Collection<DataArray>,
    pub(crate) simple_tags: Collection<SimpleTag>,
    pub(crate) data_tags: Collection<DataTag>,
    pub(crate) sources: Forest<Source>,
}

impl_entity!(Block, EntityKind::Block);

impl Block {
    pub fn new(name: impl Into<String>, block_type: Option<&str>) -> ModelResult<Self> {
        Ok(Self::from_meta(EntityMeta::new(name, block_type)?))
    }

    pub(crate) fn from_meta(meta: EntityMeta) -> Self {
        Self {
            meta,
            metadata: None,
            source_refs: Vec::new(),
            data_arrays: Collection::new(),
            simple_tags: Collection::new(),
            data_tags: Collection::new(),
            sources: Forest::new(),
        }
    }

    /// Section id attached as metadata; the section may have been deleted.
    pub fn metadata(&self) -> Option<EntityId> {
        self.metadata
    }

    /// Provenance sources referenced (not owned) by the block itself.
    pub fn source_refs(&self) -> &[EntityId] {
        &self.source_refs
    }

    pub fn data_arrays(&self) -> &Collection<DataArray> {
        &self.data_arrays
    }

    pub fn simple_tags(&self) -> &Collection<SimpleTag> {
        &self.simple_tags
    }

    pub fn data_tags(&self) -> &Collection<DataTag> {
        &self.data_tags
    }

    pub fn sources(&self) -> &Forest<Source> {
        &self.sources
    }

    pub fn data_array_by_name(&self, name: &str) -> Option<&DataArray> {
        self.data_arrays.by_name(name)
    }

    pub fn simple_tag_by_name(&self, name: &str) -> Option<&SimpleTag> {
        self.simple_tags.by_name(name)
    }

    pub fn data_tag_by_name(&self, name: &str) -> Option<&DataTag> {
        self.data_tags.by_name(name)
    }

    /// Top-level source with `name`.
    pub fn source_by_name(&self, name: &str) -> Option<&Source> {
        self.sources.child_named(None, name)
    }

    /// Number of entities owned by this block, excluding the block itself.
    pub fn owned_count(&self) -> usize {
        self.data_arrays.len()
            + self.simple_tags.len()
            + self.data_tags.len()
            + self.sources.len()
            + self
                .simple_tags
                .iter()
                .map(|tag| tag.features.len())
                .sum::<usize>()
            + self
                .data_tags
                .iter()
                .map(|tag| tag.features.len())
                .sum::<usize>()
    }
}

impl Attachments for Block {
    fn meta_slot(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn metadata_slot(&mut self) -> Option<&mut Option<EntityId>> {
        Some(&mut self.metadata)
    }

    fn sources_slot(&mut self) -> Option<&mut Vec<EntityId>> {
        Some(&mut self.source_refs)
    }
}
