//! Flat entity records exchanged with persistence backends.
//!
//! Each record carries an entity's scalar fields plus the ids of its owner
//! and of every entity it references. Records may arrive in any order;
//! `File::load` resolves references in a second pass.

use crate::error::ModelResult;
use crate::model::data_array::{element_count, ArrayBuffer, DataArray, DataType};
use crate::model::dimension::Dimension;
use crate::model::entity::{EntityId, EntityKind, EntityMeta};
use crate::model::property::Property;
use crate::model::section::Section;
use crate::model::source::Source;
use crate::model::tag::{DataTag, Feature, LinkType, SimpleTag};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: EntityId,
    pub format: String,
    pub version: (u32, u32, u32),
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub meta: EntityMeta,
    pub metadata: Option<EntityId>,
    #[serde(default)]
    pub source_refs: Vec<EntityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRecord {
    pub meta: EntityMeta,
    pub parent: Option<EntityId>,
    pub repository: Option<String>,
    pub mapping: Option<String>,
    pub link: Option<EntityId>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub block: EntityId,
    pub parent: Option<EntityId>,
    pub meta: EntityMeta,
    pub metadata: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataArrayRecord {
    pub block: EntityId,
    pub meta: EntityMeta,
    pub data_type: DataType,
    pub shape: Vec<usize>,
    /// `None` when nothing was ever written.
    pub data: Option<ArrayBuffer>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    pub label: Option<String>,
    pub unit: Option<String>,
    pub expansion_origin: Option<f64>,
    #[serde(default)]
    pub polynom_coefficients: Vec<f64>,
    pub metadata: Option<EntityId>,
    #[serde(default)]
    pub sources: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleTagRecord {
    pub block: EntityId,
    pub meta: EntityMeta,
    pub position: Vec<f64>,
    pub extent: Option<Vec<f64>>,
    #[serde(default)]
    pub units: Vec<String>,
    #[serde(default)]
    pub references: Vec<EntityId>,
    pub metadata: Option<EntityId>,
    #[serde(default)]
    pub sources: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTagRecord {
    pub block: EntityId,
    pub meta: EntityMeta,
    pub positions: EntityId,
    pub extents: Option<EntityId>,
    #[serde(default)]
    pub references: Vec<EntityId>,
    pub metadata: Option<EntityId>,
    #[serde(default)]
    pub sources: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub tag: EntityId,
    pub id: EntityId,
    pub link_type: LinkType,
    pub data: EntityId,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One persisted entity, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRecord {
    File(FileRecord),
    Block(BlockRecord),
    Section(SectionRecord),
    Source(SourceRecord),
    DataArray(DataArrayRecord),
    SimpleTag(SimpleTagRecord),
    DataTag(DataTagRecord),
    Feature(FeatureRecord),
}

impl EntityRecord {
    pub fn id(&self) -> EntityId {
        match self {
            Self::File(record) => record.id,
            Self::Block(record) => record.meta.id,
            Self::Section(record) => record.meta.id,
            Self::Source(record) => record.meta.id,
            Self::DataArray(record) => record.meta.id,
            Self::SimpleTag(record) => record.meta.id,
            Self::DataTag(record) => record.meta.id,
            Self::Feature(record) => record.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::File(_) => EntityKind::File,
            Self::Block(_) => EntityKind::Block,
            Self::Section(_) => EntityKind::Section,
            Self::Source(_) => EntityKind::Source,
            Self::DataArray(_) => EntityKind::DataArray,
            Self::SimpleTag(_) => EntityKind::SimpleTag,
            Self::DataTag(_) => EntityKind::DataTag,
            Self::Feature(_) => EntityKind::Feature,
        }
    }
}

impl SectionRecord {
    pub(crate) fn capture(section: &Section, parent: Option<EntityId>) -> Self {
        Self {
            meta: section.meta.clone(),
            parent,
            repository: section.repository.clone(),
            mapping: section.mapping.clone(),
            link: section.link,
            properties: section.properties.clone(),
        }
    }

    pub(crate) fn into_section(self) -> Section {
        Section {
            meta: self.meta,
            repository: self.repository,
            mapping: self.mapping,
            link: self.link,
            properties: self.properties,
        }
    }
}

impl SourceRecord {
    pub(crate) fn capture(source: &Source, block: EntityId, parent: Option<EntityId>) -> Self {
        Self {
            block,
            parent,
            meta: source.meta.clone(),
            metadata: source.metadata,
        }
    }

    pub(crate) fn to_source(&self) -> Source {
        Source {
            meta: self.meta.clone(),
            metadata: self.metadata,
        }
    }
}

impl DataArrayRecord {
    pub(crate) fn capture(array: &DataArray, block: EntityId) -> Self {
        Self {
            block,
            meta: array.meta.clone(),
            data_type: array.data_type,
            shape: array.shape.clone(),
            data: array.written.then(|| array.data.clone()),
            dimensions: array.dimensions.clone(),
            label: array.label.clone(),
            unit: array.unit.clone(),
            expansion_origin: array.expansion_origin,
            polynom_coefficients: array.polynom_coefficients.clone(),
            metadata: array.metadata,
            sources: array.sources.clone(),
        }
    }

    pub(crate) fn into_data_array(self) -> ModelResult<DataArray> {
        let len = element_count(&self.shape)?;
        let written = self.data.is_some();
        Ok(DataArray {
            meta: self.meta,
            data_type: self.data_type,
            data: self
                .data
                .unwrap_or_else(|| ArrayBuffer::filled(self.data_type, len)),
            shape: self.shape,
            written,
            dimensions: self.dimensions,
            label: self.label,
            unit: self.unit,
            expansion_origin: self.expansion_origin,
            polynom_coefficients: self.polynom_coefficients,
            metadata: self.metadata,
            sources: self.sources,
        })
    }
}

impl SimpleTagRecord {
    pub(crate) fn capture(tag: &SimpleTag, block: EntityId) -> Self {
        Self {
            block,
            meta: tag.meta.clone(),
            position: tag.position.clone(),
            extent: tag.extent.clone(),
            units: tag.units.clone(),
            references: tag.references.clone(),
            metadata: tag.metadata,
            sources: tag.sources.clone(),
        }
    }

    /// Tag without references or features; those are attached after checks.
    pub(crate) fn to_bare_tag(&self) -> SimpleTag {
        SimpleTag {
            meta: self.meta.clone(),
            position: self.position.clone(),
            extent: self.extent.clone(),
            units: self.units.clone(),
            references: Vec::new(),
            features: Vec::new(),
            metadata: self.metadata,
            sources: self.sources.clone(),
        }
    }
}

impl DataTagRecord {
    pub(crate) fn capture(tag: &DataTag, block: EntityId) -> Self {
        Self {
            block,
            meta: tag.meta.clone(),
            positions: tag.positions,
            extents: tag.extents,
            references: tag.references.clone(),
            metadata: tag.metadata,
            sources: tag.sources.clone(),
        }
    }

    /// Tag without references or features; those are attached after checks.
    pub(crate) fn to_bare_tag(&self) -> DataTag {
        DataTag {
            meta: self.meta.clone(),
            positions: self.positions,
            extents: self.extents,
            references: Vec::new(),
            features: Vec::new(),
            metadata: self.metadata,
            sources: self.sources.clone(),
        }
    }
}

impl FeatureRecord {
    pub(crate) fn capture(feature: &Feature, tag: EntityId) -> Self {
        Self {
            tag,
            id: feature.id,
            link_type: feature.link_type,
            data: feature.data,
            created_at: feature.created_at,
            updated_at: feature.updated_at,
        }
    }

    pub(crate) fn to_feature(&self) -> Feature {
        Feature {
            id: self.id,
            link_type: self.link_type,
            data: self.data,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
