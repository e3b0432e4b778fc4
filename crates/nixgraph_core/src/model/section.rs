//! Metadata tree node.
//!
//! # Invariants
//! - Property names are unique within one section.
//! - `link` is a non-owning id; ownership lives in the file's section forest.

use crate::error::{ModelError, ModelResult};
use crate::model::entity::{impl_entity, Attachments, EntityId, EntityKind, EntityMeta};
use crate::model::property::Property;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub(crate) meta: EntityMeta,
    pub(crate) repository: Option<String>,
    pub(crate) mapping: Option<String>,
    pub(crate) link: Option<EntityId>,
    pub(crate) properties: Vec<Property>,
}

impl_entity!(Section, EntityKind::Section);

impl Section {
    pub fn new(name: impl Into<String>, section_type: Option<&str>) -> ModelResult<Self> {
        Ok(Self::from_meta(EntityMeta::new(name, section_type)?))
    }

    pub(crate) fn from_meta(meta: EntityMeta) -> Self {
        Self {
            meta,
            repository: None,
            mapping: None,
            link: None,
            properties: Vec::new(),
        }
    }

    /// Copy named `name` with fresh ids for the section and its properties.
    pub(crate) fn duplicate(&self, name: &str) -> ModelResult<Self> {
        let mut meta = EntityMeta::new(name, self.meta.entity_type.as_deref())?;
        meta.definition = self.meta.definition.clone();
        Ok(Self {
            meta,
            repository: self.repository.clone(),
            mapping: self.mapping.clone(),
            link: self.link,
            properties: self.properties.iter().map(Property::duplicate).collect(),
        })
    }

    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    pub fn mapping(&self) -> Option<&str> {
        self.mapping.as_deref()
    }

    /// Id of the linked section, if any. The target may no longer exist.
    pub fn link(&self) -> Option<EntityId> {
        self.link
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|prop| prop.name() == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    pub(crate) fn property_mut(&mut self, name: &str) -> ModelResult<&mut Property> {
        let section = self.meta.id;
        self.properties
            .iter_mut()
            .find(|prop| prop.name() == name)
            .ok_or_else(|| ModelError::PropertyNotFound {
                section,
                name: name.to_string(),
            })
    }

    /// Inserts or replaces the property with the same name, keeping its slot.
    pub(crate) fn upsert_property(&mut self, property: Property) {
        match self
            .properties
            .iter()
            .position(|existing| existing.name() == property.name())
        {
            Some(index) => self.properties[index] = property,
            None => self.properties.push(property),
        }
        self.meta.touch();
    }

    pub(crate) fn remove_property(&mut self, name: &str) -> ModelResult<Property> {
        let index = self
            .properties
            .iter()
            .position(|prop| prop.name() == name)
            .ok_or_else(|| ModelError::PropertyNotFound {
                section: self.meta.id,
                name: name.to_string(),
            })?;
        self.meta.touch();
        Ok(self.properties.remove(index))
    }
}

impl Attachments for Section {
    fn meta_slot(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}
