//! Provenance tree node.

use crate::error::ModelResult;
use crate::model::entity::{impl_entity, Attachments, EntityId, EntityKind, EntityMeta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub(crate) meta: EntityMeta,
    pub(crate) metadata: Option<EntityId>,
}

impl_entity!(Source, EntityKind::Source);

impl Source {
    pub fn new(name: impl Into<String>, source_type: Option<&str>) -> ModelResult<Self> {
        Ok(Self {
            meta: EntityMeta::new(name, source_type)?,
            metadata: None,
        })
    }

    pub fn metadata(&self) -> Option<EntityId> {
        self.metadata
    }
}

impl Attachments for Source {
    fn meta_slot(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn metadata_slot(&mut self) -> Option<&mut Option<EntityId>> {
        Some(&mut self.metadata)
    }
}
