//! Ordered, name-scoped entity collection.
//!
//! # Invariants
//! - Ids are unique inside one collection.
//! - Names are unique inside one collection (one kind within one owner).
//! - Iteration follows insertion order.

use crate::error::{ModelError, ModelResult};
use crate::model::entity::{validate_name, Entity, EntityId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Collection<T> {
    order: Vec<EntityId>,
    items: HashMap<EntityId, T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            items: HashMap::new(),
        }
    }
}

impl<T: Entity> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&T> {
        self.iter().find(|item| item.name() == name)
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    /// Mutable access to every member, in no particular order.
    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.items.values_mut()
    }

    /// Fails with `DuplicateName` if another member (not `except`) uses `name`.
    pub fn ensure_name_free(&self, name: &str, except: Option<EntityId>) -> ModelResult<()> {
        let taken = self
            .iter()
            .any(|item| item.name() == name && Some(item.id()) != except);
        if taken {
            return Err(ModelError::DuplicateName {
                kind: T::KIND,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, item: T) -> ModelResult<EntityId> {
        let id = item.id();
        if self.contains(id) {
            return Err(ModelError::DuplicateId(id));
        }
        self.ensure_name_free(item.name(), None)?;
        self.order.push(id);
        self.items.insert(id, item);
        Ok(id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let item = self.items.remove(&id)?;
        self.order.retain(|existing| *existing != id);
        Some(item)
    }

    pub fn rename(&mut self, id: EntityId, name: &str) -> ModelResult<()> {
        validate_name(name)?;
        if !self.contains(id) {
            return Err(ModelError::NotFound(id));
        }
        self.ensure_name_free(name, Some(id))?;
        let item = self.items.get_mut(&id).ok_or(ModelError::NotFound(id))?;
        let meta = item.meta_mut();
        meta.name = name.to_string();
        meta.touch();
        Ok(())
    }
}
