//! Source tree operations.
//!
//! # Invariants
//! - A source is owned by exactly one block or parent source.
//! - Moves stay inside the owning block and never create a cycle.
//! - Deleting a source subtree detaches its ids from every `sources` list.

use crate::backend::{CommitEvent, Operation};
use crate::error::{ModelError, ModelResult};
use crate::file::{File, Location};
use crate::model::entity::{EntityId, EntityKind};
use crate::model::source::Source;
use log::info;
use std::collections::HashSet;

impl File {
    pub fn source(&self, id: EntityId) -> ModelResult<&Source> {
        let location = self.locate_kind(id, EntityKind::Source)?;
        self.block_at(location, id)?
            .sources
            .get(id)
            .ok_or(ModelError::NotFound(id))
    }

    /// Owning block of a source.
    pub fn source_block(&self, id: EntityId) -> ModelResult<EntityId> {
        self.locate_kind(id, EntityKind::Source)?
            .block
            .ok_or(ModelError::NotFound(id))
    }

    /// Parent source; `None` for sources directly under the block.
    pub fn parent_source(&self, id: EntityId) -> ModelResult<Option<EntityId>> {
        let location = self.locate_kind(id, EntityKind::Source)?;
        Ok(self.block_at(location, id)?.sources.parent(id))
    }

    /// Creates a source directly under `block`.
    pub fn create_source(
        &mut self,
        block: EntityId,
        name: &str,
        source_type: Option<&str>,
    ) -> ModelResult<EntityId> {
        let source = Source::new(name, source_type)?;
        let id = self.block_mut(block)?.sources.insert(source, None)?;
        self.register(id, Location::in_block(EntityKind::Source, block));
        self.commit(id, EntityKind::Source, Operation::Create, None)?;
        Ok(id)
    }

    /// Creates a source under `parent`, in the parent's block.
    pub fn create_child_source(
        &mut self,
        parent: EntityId,
        name: &str,
        source_type: Option<&str>,
    ) -> ModelResult<EntityId> {
        let block = self.source_block(parent)?;
        let source = Source::new(name, source_type)?;
        let id = self.block_mut(block)?.sources.insert(source, Some(parent))?;
        self.register(id, Location::in_block(EntityKind::Source, block));
        self.commit(id, EntityKind::Source, Operation::Create, None)?;
        Ok(id)
    }

    /// Deletes a source and its descendants.
    pub fn delete_source(&mut self, id: EntityId) -> ModelResult<()> {
        let location = self.locate_kind(id, EntityKind::Source)?;
        let removed = self.block_mut_at(location, id)?.sources.remove_subtree(id)?;
        let removed_ids: HashSet<EntityId> = removed.iter().map(|s| s.meta.id).collect();
        for removed_id in &removed_ids {
            self.registry.remove(removed_id);
        }
        let detached = self.detach_sources(&removed_ids);
        info!(
            "event=source_delete module=file status=ok source_id={} removed={} detached_refs={}",
            id,
            removed.len(),
            detached.len()
        );

        let mut events: Vec<CommitEvent> = removed
            .iter()
            .map(|source| CommitEvent {
                entity_id: source.meta.id,
                kind: EntityKind::Source,
                operation: Operation::Delete,
                field: None,
            })
            .collect();
        events.extend(detached.into_iter().map(|(entity_id, kind)| CommitEvent {
            entity_id,
            kind,
            operation: Operation::Update,
            field: Some("sources"),
        }));
        self.commit_all(events)
    }

    /// Re-parents a source inside its block; `None` moves it under the block.
    pub fn move_source(&mut self, id: EntityId, new_parent: Option<EntityId>) -> ModelResult<()> {
        let block = self.source_block(id)?;
        if let Some(parent) = new_parent {
            if self.source_block(parent)? != block {
                return Err(ModelError::NotFound(parent));
            }
        }
        let sources = &mut self.block_mut(block)?.sources;
        sources.reparent(id, new_parent)?;
        if let Some(source) = sources.get_mut(id) {
            source.meta.touch();
        }
        self.commit(id, EntityKind::Source, Operation::Update, Some("parent"))
    }

    /// Depth-first search over a block's source tree, or one subtree of it.
    pub fn find_sources(
        &self,
        block: EntityId,
        start: Option<EntityId>,
        max_depth: Option<usize>,
        filter: impl Fn(&Source) -> bool,
    ) -> ModelResult<Vec<&Source>> {
        self.block(block)?.sources.walk(start, max_depth, filter)
    }
}
