//! Region-of-interest descriptors and their feature links.
//!
//! # Responsibility
//! - `SimpleTag`: one region given by an inline position/extent pair.
//! - `DataTag`: many regions given by positions/extents data arrays.
//! - `Feature`: non-owning link from a tag to an auxiliary data array.
//!
//! # Invariants
//! - Reference and feature ids are non-owning; geometry consistency is
//!   enforced by the owning file when they are attached or edited.
//! - `references` holds no duplicate ids.

use crate::error::{ModelError, ModelResult};
use crate::model::entity::{
    create_id, impl_entity, now_ms, Attachments, Entity, EntityId, EntityKind, EntityMeta,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// How a tag's geometry selects data from a feature array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Feature is read with the tag's own position/extent.
    Tagged,
    /// Feature is returned whole.
    Untagged,
    /// Tag position (or region index) selects a slice on axis 0.
    Indexed,
}

impl LinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tagged => "tagged",
            Self::Untagged => "untagged",
            Self::Indexed => "indexed",
        }
    }
}

impl Display for LinkType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tagged" => Ok(Self::Tagged),
            "untagged" => Ok(Self::Untagged),
            "indexed" => Ok(Self::Indexed),
            _ => Err(ModelError::InvalidData(format!("unknown link type `{s}`"))),
        }
    }
}

/// Link from a tag to a data array. Identified by id only; it has no name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub(crate) id: EntityId,
    pub(crate) link_type: LinkType,
    pub(crate) data: EntityId,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

impl Feature {
    pub(crate) fn new(link_type: LinkType, data: EntityId) -> Self {
        let stamp = now_ms();
        Self {
            id: create_id(),
            link_type,
            data,
            created_at: stamp,
            updated_at: stamp,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Id of the linked data array.
    pub fn data(&self) -> EntityId {
        self.data
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = now_ms().max(self.updated_at + 1);
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Feature {}

impl Display for Feature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Feature: {{id = {}, link_type = {}}}",
            self.id, self.link_type
        )
    }
}

/// Read access shared by both tag kinds.
pub trait Tag: Entity {
    /// Ids of the tagged data arrays, in attach order.
    fn references(&self) -> &[EntityId];

    fn features(&self) -> &[Feature];

    fn metadata(&self) -> Option<EntityId>;

    fn sources(&self) -> &[EntityId];

    fn feature(&self, id: EntityId) -> Option<&Feature> {
        self.features().iter().find(|feature| feature.id == id)
    }

    fn has_reference(&self, id: EntityId) -> bool {
        self.references().contains(&id)
    }
}

/// Tag with a single inline region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleTag {
    pub(crate) meta: EntityMeta,
    pub(crate) position: Vec<f64>,
    pub(crate) extent: Option<Vec<f64>>,
    pub(crate) units: Vec<String>,
    pub(crate) references: Vec<EntityId>,
    pub(crate) features: Vec<Feature>,
    pub(crate) metadata: Option<EntityId>,
    pub(crate) sources: Vec<EntityId>,
}

impl_entity!(SimpleTag, EntityKind::SimpleTag);

impl SimpleTag {
    pub fn new(
        name: impl Into<String>,
        tag_type: Option<&str>,
        position: Vec<f64>,
    ) -> ModelResult<Self> {
        Ok(Self {
            meta: EntityMeta::new(name, tag_type)?,
            position,
            extent: None,
            units: Vec::new(),
            references: Vec::new(),
            features: Vec::new(),
            metadata: None,
            sources: Vec::new(),
        })
    }

    pub fn position(&self) -> &[f64] {
        &self.position
    }

    pub fn extent(&self) -> Option<&[f64]> {
        self.extent.as_deref()
    }

    /// Per-axis units of position and extent; empty when unset.
    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Length of the position vector; every reference must have this rank.
    pub fn rank(&self) -> usize {
        self.position.len()
    }
}

impl Tag for SimpleTag {
    fn references(&self) -> &[EntityId] {
        &self.references
    }

    fn features(&self) -> &[Feature] {
        &self.features
    }

    fn metadata(&self) -> Option<EntityId> {
        self.metadata
    }

    fn sources(&self) -> &[EntityId] {
        &self.sources
    }
}

impl Attachments for SimpleTag {
    fn meta_slot(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn metadata_slot(&mut self) -> Option<&mut Option<EntityId>> {
        Some(&mut self.metadata)
    }

    fn sources_slot(&mut self) -> Option<&mut Vec<EntityId>> {
        Some(&mut self.sources)
    }
}

/// Tag whose regions are rows of a positions (and optional extents) array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTag {
    pub(crate) meta: EntityMeta,
    pub(crate) positions: EntityId,
    pub(crate) extents: Option<EntityId>,
    pub(crate) references: Vec<EntityId>,
    pub(crate) features: Vec<Feature>,
    pub(crate) metadata: Option<EntityId>,
    pub(crate) sources: Vec<EntityId>,
}

impl_entity!(DataTag, EntityKind::DataTag);

impl DataTag {
    pub(crate) fn new(
        name: impl Into<String>,
        tag_type: Option<&str>,
        positions: EntityId,
    ) -> ModelResult<Self> {
        Ok(Self {
            meta: EntityMeta::new(name, tag_type)?,
            positions,
            extents: None,
            references: Vec::new(),
            features: Vec::new(),
            metadata: None,
            sources: Vec::new(),
        })
    }

    /// Id of the positions data array.
    pub fn positions(&self) -> EntityId {
        self.positions
    }

    pub fn extents(&self) -> Option<EntityId> {
        self.extents
    }
}

impl Tag for DataTag {
    fn references(&self) -> &[EntityId] {
        &self.references
    }

    fn features(&self) -> &[Feature] {
        &self.features
    }

    fn metadata(&self) -> Option<EntityId> {
        self.metadata
    }

    fn sources(&self) -> &[EntityId] {
        &self.sources
    }
}

impl Attachments for DataTag {
    fn meta_slot(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn metadata_slot(&mut self) -> Option<&mut Option<EntityId>> {
        Some(&mut self.metadata)
    }

    fn sources_slot(&mut self) -> Option<&mut Vec<EntityId>> {
        Some(&mut self.sources)
    }
}

#[cfg(test)]
mod tests {
    use super::{Feature, LinkType, SimpleTag};
    use crate::model::entity::create_id;

    #[test]
    fn link_type_parses_case_insensitively() {
        assert_eq!("Tagged".parse::<LinkType>().unwrap(), LinkType::Tagged);
        assert_eq!(" INDEXED ".parse::<LinkType>().unwrap(), LinkType::Indexed);
        assert!("sliced".parse::<LinkType>().is_err());
    }

    #[test]
    fn feature_renders_link_type() {
        let feature = Feature::new(LinkType::Untagged, create_id());
        let rendered = feature.to_string();
        assert!(rendered.starts_with("Feature: {id = "));
        assert!(rendered.ends_with("link_type = untagged}"));
    }

    #[test]
    fn simple_tag_renders_kind_and_name() {
        let tag = SimpleTag::new("stimulus", None, vec![1.0]).unwrap();
        assert_eq!(
            tag.to_string(),
            format!("SimpleTag: {{id = {}, name = stimulus}}", tag.meta.id)
        );
    }
}
