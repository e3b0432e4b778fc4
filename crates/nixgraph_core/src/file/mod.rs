//! Root container and mutation facade.
//!
//! # Responsibility
//! - Own every block and the metadata section forest.
//! - Index every live entity id to its kind and owning container.
//! - Perform every cross-entity mutation with validate-then-commit and
//!   report it to the installed commit hook.
//!
//! # Invariants
//! - Entity ids are unique across all kinds in one file.
//! - A mutation that returns an error other than `Backend` changed nothing.
//! - Deleting an owning container removes everything it owns; referenced
//!   sources and sections are never removed through references.

use crate::backend::{CommitEvent, CommitHook, Operation};
use crate::error::{ModelError, ModelResult};
use crate::model::block::Block;
use crate::model::entity::{create_id, now_ms, Attachments, EntityId, EntityKind};
use crate::model::section::Section;
use crate::store::{Collection, Forest};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};

mod data;
mod load;
mod metadata;
mod sources;
mod tagging;

/// Header fields of a new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOptions {
    pub format: String,
    pub version: (u32, u32, u32),
    /// When false, mutations are not reported to the commit hook.
    pub record_commits: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            format: "nix".to_string(),
            version: (1, 2, 0),
            record_commits: true,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FileHeader {
    pub(crate) id: EntityId,
    pub(crate) format: String,
    pub(crate) version: (u32, u32, u32),
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
    pub(crate) record_commits: bool,
}

/// Where a registered id lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Location {
    pub(crate) kind: EntityKind,
    /// Owning block for block-scoped kinds.
    pub(crate) block: Option<EntityId>,
    /// Owning tag for features.
    pub(crate) owner: Option<EntityId>,
}

impl Location {
    pub(crate) fn top(kind: EntityKind) -> Self {
        Self {
            kind,
            block: None,
            owner: None,
        }
    }

    pub(crate) fn in_block(kind: EntityKind, block: EntityId) -> Self {
        Self {
            kind,
            block: Some(block),
            owner: None,
        }
    }
}

/// Root of one object graph.
///
/// Share across threads as `Arc<RwLock<File>>`; every mutation takes
/// `&mut self`, so composite fields change under one exclusive borrow.
pub struct File {
    pub(crate) header: FileHeader,
    pub(crate) blocks: Collection<Block>,
    pub(crate) sections: Forest<Section>,
    pub(crate) registry: HashMap<EntityId, Location>,
    hook: Option<Box<dyn CommitHook + Send + Sync>>,
}

impl Debug for File {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("id", &self.header.id)
            .field("format", &self.header.format)
            .field("version", &self.header.version)
            .field("blocks", &self.blocks.len())
            .field("sections", &self.sections.len())
            .field("entities", &self.registry.len())
            .field("has_commit_hook", &self.hook.is_some())
            .finish()
    }
}

impl Default for File {
    fn default() -> Self {
        Self::new()
    }
}

impl File {
    pub fn new() -> Self {
        Self::with_options(FileOptions::default())
    }

    pub fn with_options(options: FileOptions) -> Self {
        let stamp = now_ms();
        let header = FileHeader {
            id: create_id(),
            format: options.format,
            version: options.version,
            created_at: stamp,
            updated_at: stamp,
            record_commits: options.record_commits,
        };
        info!(
            "event=file_open module=file status=ok file_id={} format={}",
            header.id, header.format
        );
        Self::from_header(header)
    }

    pub(crate) fn from_header(header: FileHeader) -> Self {
        let mut registry = HashMap::new();
        registry.insert(header.id, Location::top(EntityKind::File));
        Self {
            header,
            blocks: Collection::new(),
            sections: Forest::new(),
            registry,
            hook: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.header.id
    }

    pub fn format(&self) -> &str {
        &self.header.format
    }

    pub fn version(&self) -> (u32, u32, u32) {
        self.header.version
    }

    pub fn created_at(&self) -> i64 {
        self.header.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.header.updated_at
    }

    /// Installs the hook receiving every later commit; replaces any previous one.
    pub fn set_commit_hook(&mut self, hook: Box<dyn CommitHook + Send + Sync>) {
        self.hook = Some(hook);
    }

    pub fn take_commit_hook(&mut self) -> Option<Box<dyn CommitHook + Send + Sync>> {
        self.hook.take()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.registry.contains_key(&id)
    }

    pub fn kind_of(&self, id: EntityId) -> Option<EntityKind> {
        self.registry.get(&id).map(|location| location.kind)
    }

    /// Number of live entities, the file itself included.
    pub fn entity_count(&self) -> usize {
        self.registry.len()
    }

    pub fn blocks(&self) -> &Collection<Block> {
        &self.blocks
    }

    pub fn block(&self, id: EntityId) -> ModelResult<&Block> {
        self.blocks.get(id).ok_or(ModelError::NotFound(id))
    }

    pub(crate) fn block_mut(&mut self, id: EntityId) -> ModelResult<&mut Block> {
        self.blocks.get_mut(id).ok_or(ModelError::NotFound(id))
    }

    pub fn block_by_name(&self, name: &str) -> Option<&Block> {
        self.blocks.by_name(name)
    }

    pub fn create_block(&mut self, name: &str, block_type: Option<&str>) -> ModelResult<EntityId> {
        let block = Block::new(name, block_type)?;
        let id = self.blocks.insert(block)?;
        self.register(id, Location::top(EntityKind::Block));
        self.commit(id, EntityKind::Block, Operation::Create, None)?;
        Ok(id)
    }

    /// Deletes a block and everything it owns.
    ///
    /// Sources owned elsewhere stay, even when deleted entities referenced
    /// them. Ids of sources owned by this block are detached from every
    /// other `sources` list.
    pub fn delete_block(&mut self, id: EntityId) -> ModelResult<()> {
        let block = self.blocks.remove(id).ok_or(ModelError::NotFound(id))?;

        let mut removed: Vec<(EntityId, EntityKind)> = Vec::new();
        for tag in block.simple_tags.iter() {
            removed.extend(tag.features.iter().map(|f| (f.id, EntityKind::Feature)));
            removed.push((tag.meta.id, EntityKind::SimpleTag));
        }
        for tag in block.data_tags.iter() {
            removed.extend(tag.features.iter().map(|f| (f.id, EntityKind::Feature)));
            removed.push((tag.meta.id, EntityKind::DataTag));
        }
        removed.extend(
            block
                .data_arrays
                .iter()
                .map(|array| (array.meta.id, EntityKind::DataArray)),
        );
        let owned_sources: HashSet<EntityId> = block.sources.iter().map(|s| s.meta.id).collect();
        removed.extend(
            block
                .sources
                .iter()
                .map(|source| (source.meta.id, EntityKind::Source)),
        );
        removed.push((id, EntityKind::Block));

        for (removed_id, _) in &removed {
            self.registry.remove(removed_id);
        }
        let detached = self.detach_sources(&owned_sources);
        info!(
            "event=block_delete module=file status=ok block_id={} removed={} detached_refs={}",
            id,
            removed.len(),
            detached.len()
        );

        let mut events: Vec<CommitEvent> = removed
            .into_iter()
            .map(|(entity_id, kind)| CommitEvent {
                entity_id,
                kind,
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

    /// Renames any named entity, re-checking its uniqueness scope.
    pub fn set_name(&mut self, id: EntityId, name: &str) -> ModelResult<()> {
        let location = self.locate(id)?;
        match location.kind {
            EntityKind::Block => self.blocks.rename(id, name)?,
            EntityKind::Section => self.sections.rename(id, name)?,
            EntityKind::DataArray => self.block_mut_at(location, id)?.data_arrays.rename(id, name)?,
            EntityKind::SimpleTag => self.block_mut_at(location, id)?.simple_tags.rename(id, name)?,
            EntityKind::DataTag => self.block_mut_at(location, id)?.data_tags.rename(id, name)?,
            EntityKind::Source => self.block_mut_at(location, id)?.sources.rename(id, name)?,
            EntityKind::Feature | EntityKind::File => return Err(unnamed(location.kind)),
        }
        self.commit(id, location.kind, Operation::Update, Some("name"))
    }

    pub fn set_type(&mut self, id: EntityId, entity_type: Option<&str>) -> ModelResult<()> {
        let kind = self.locate(id)?.kind;
        let meta = self.attachments_mut(id)?.meta_slot();
        meta.entity_type = entity_type.map(str::to_string);
        meta.touch();
        self.commit(id, kind, Operation::Update, Some("type"))
    }

    pub fn set_definition(&mut self, id: EntityId, definition: Option<&str>) -> ModelResult<()> {
        let kind = self.locate(id)?.kind;
        let meta = self.attachments_mut(id)?.meta_slot();
        meta.definition = definition.map(str::to_string);
        meta.touch();
        self.commit(id, kind, Operation::Update, Some("definition"))
    }

    /// Overrides the creation stamp, e.g. when importing foreign data.
    pub fn force_created_at(&mut self, id: EntityId, created_at: i64) -> ModelResult<()> {
        let kind = self.locate(id)?.kind;
        match kind {
            EntityKind::File => self.header.created_at = created_at,
            EntityKind::Feature => {
                let feature = self.feature_mut(id)?;
                feature.created_at = created_at;
                feature.touch();
            }
            _ => {
                let meta = self.attachments_mut(id)?.meta_slot();
                meta.created_at = created_at;
                meta.touch();
            }
        }
        self.commit(id, kind, Operation::Update, Some("created_at"))
    }

    /// Points the entity's metadata at `section`; fails with `NotFound` if it
    /// does not exist.
    pub fn set_metadata(&mut self, id: EntityId, section: EntityId) -> ModelResult<()> {
        if !self.sections.contains(section) {
            return Err(ModelError::NotFound(section));
        }
        self.replace_metadata(id, Some(section))
    }

    pub fn clear_metadata(&mut self, id: EntityId) -> ModelResult<()> {
        self.replace_metadata(id, None)
    }

    fn replace_metadata(&mut self, id: EntityId, section: Option<EntityId>) -> ModelResult<()> {
        let kind = self.locate(id)?.kind;
        let target = self.attachments_mut(id)?;
        let slot = target.metadata_slot().ok_or(ModelError::TypeMismatch {
            expected: "metadata-bearing entity",
            actual: kind.as_str(),
        })?;
        *slot = section;
        target.meta_slot().touch();
        self.commit(id, kind, Operation::Update, Some("metadata"))
    }

    /// Adds a source reference; a no-op if already present.
    pub fn add_source(&mut self, id: EntityId, source: EntityId) -> ModelResult<()> {
        if self.kind_of(source) != Some(EntityKind::Source) {
            return Err(ModelError::NotFound(source));
        }
        let kind = self.locate(id)?.kind;
        let target = self.attachments_mut(id)?;
        let list = target.sources_slot().ok_or(ModelError::TypeMismatch {
            expected: "source-referencing entity",
            actual: kind.as_str(),
        })?;
        if list.contains(&source) {
            return Ok(());
        }
        list.push(source);
        target.meta_slot().touch();
        self.commit(id, kind, Operation::Update, Some("sources"))
    }

    /// Removes a source reference; a no-op if absent.
    pub fn remove_source(&mut self, id: EntityId, source: EntityId) -> ModelResult<()> {
        let kind = self.locate(id)?.kind;
        let target = self.attachments_mut(id)?;
        let list = target.sources_slot().ok_or(ModelError::TypeMismatch {
            expected: "source-referencing entity",
            actual: kind.as_str(),
        })?;
        let before = list.len();
        list.retain(|existing| *existing != source);
        if list.len() == before {
            return Ok(());
        }
        target.meta_slot().touch();
        self.commit(id, kind, Operation::Update, Some("sources"))
    }

    pub(crate) fn locate(&self, id: EntityId) -> ModelResult<Location> {
        self.registry
            .get(&id)
            .copied()
            .ok_or(ModelError::NotFound(id))
    }

    pub(crate) fn register(&mut self, id: EntityId, location: Location) {
        self.registry.insert(id, location);
    }

    pub(crate) fn block_mut_at(
        &mut self,
        location: Location,
        id: EntityId,
    ) -> ModelResult<&mut Block> {
        let block = location.block.ok_or(ModelError::NotFound(id))?;
        self.blocks.get_mut(block).ok_or(ModelError::NotFound(block))
    }

    pub(crate) fn block_at(&self, location: Location, id: EntityId) -> ModelResult<&Block> {
        let block = location.block.ok_or(ModelError::NotFound(id))?;
        self.blocks.get(block).ok_or(ModelError::NotFound(block))
    }

    fn attachments_mut(&mut self, id: EntityId) -> ModelResult<&mut dyn Attachments> {
        let location = self.locate(id)?;
        let missing = ModelError::NotFound(id);
        let target: &mut dyn Attachments = match location.kind {
            EntityKind::Block => self.blocks.get_mut(id).ok_or(missing)?,
            EntityKind::Section => self.sections.get_mut(id).ok_or(missing)?,
            EntityKind::DataArray => self
                .block_mut_at(location, id)?
                .data_arrays
                .get_mut(id)
                .ok_or(missing)?,
            EntityKind::SimpleTag => self
                .block_mut_at(location, id)?
                .simple_tags
                .get_mut(id)
                .ok_or(missing)?,
            EntityKind::DataTag => self
                .block_mut_at(location, id)?
                .data_tags
                .get_mut(id)
                .ok_or(missing)?,
            EntityKind::Source => self
                .block_mut_at(location, id)?
                .sources
                .get_mut(id)
                .ok_or(missing)?,
            EntityKind::Feature | EntityKind::File => return Err(unnamed(location.kind)),
        };
        Ok(target)
    }

    /// Removes `removed` from every `sources` list; returns the touched entities.
    pub(crate) fn detach_sources(
        &mut self,
        removed: &HashSet<EntityId>,
    ) -> Vec<(EntityId, EntityKind)> {
        let mut touched = Vec::new();
        if removed.is_empty() {
            return touched;
        }
        fn sweep(
            target: &mut dyn Attachments,
            removed: &HashSet<EntityId>,
            kind: EntityKind,
            touched: &mut Vec<(EntityId, EntityKind)>,
        ) {
            let Some(list) = target.sources_slot() else {
                return;
            };
            let before = list.len();
            list.retain(|id| !removed.contains(id));
            if list.len() != before {
                let meta = target.meta_slot();
                meta.touch();
                touched.push((meta.id, kind));
            }
        }
        for block in self.blocks.values_mut() {
            sweep(block, removed, EntityKind::Block, &mut touched);
            for array in block.data_arrays.values_mut() {
                sweep(array, removed, EntityKind::DataArray, &mut touched);
            }
            for tag in block.simple_tags.values_mut() {
                sweep(tag, removed, EntityKind::SimpleTag, &mut touched);
            }
            for tag in block.data_tags.values_mut() {
                sweep(tag, removed, EntityKind::DataTag, &mut touched);
            }
        }
        touched
    }

    pub(crate) fn commit(
        &mut self,
        entity_id: EntityId,
        kind: EntityKind,
        operation: Operation,
        field: Option<&'static str>,
    ) -> ModelResult<()> {
        self.commit_all(vec![CommitEvent {
            entity_id,
            kind,
            operation,
            field,
        }])
    }

    /// Reports committed events in order; stops at the first hook failure.
    pub(crate) fn commit_all(&mut self, events: Vec<CommitEvent>) -> ModelResult<()> {
        self.header.updated_at = now_ms().max(self.header.updated_at + 1);
        for event in events {
            debug!(
                "event=commit module=file status=ok entity_id={} kind={} operation={} field={}",
                event.entity_id,
                event.kind,
                event.operation,
                event.field.unwrap_or("-")
            );
            if !self.header.record_commits {
                continue;
            }
            if let Some(hook) = self.hook.as_mut() {
                hook.on_commit(&event)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn unnamed(kind: EntityKind) -> ModelError {
    ModelError::TypeMismatch {
        expected: "named entity",
        actual: kind.as_str(),
    }
}
