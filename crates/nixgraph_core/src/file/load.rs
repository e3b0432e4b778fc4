//! Snapshot export and two-pass reconstruction.
//!
//! # Responsibility
//! - Flatten a file into `EntityRecord`s in dependency order.
//! - Rebuild a file from records arriving in any order.
//!
//! # Invariants
//! - Loading never reports commits to a hook.
//! - A loaded file satisfies the same invariants as one built by mutation:
//!   unique ids and names, acyclic trees, consistent tag geometry.
//! - Dangling metadata and section links are kept and logged.

use super::tagging::{check_data_tag, check_simple_tag, ArrayView};
use crate::backend::records::{
    BlockRecord, DataArrayRecord, DataTagRecord, EntityRecord, FeatureRecord, FileRecord,
    SectionRecord, SimpleTagRecord, SourceRecord,
};
use crate::error::{ModelError, ModelResult};
use crate::file::{File, FileHeader, FileOptions, Location};
use crate::model::block::Block;
use crate::model::entity::{create_id, now_ms, EntityId, EntityKind};
use crate::model::tag::Feature;
use log::{info, warn};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Buckets {
    file: Option<FileRecord>,
    blocks: Vec<BlockRecord>,
    sections: Vec<SectionRecord>,
    sources: Vec<SourceRecord>,
    data_arrays: Vec<DataArrayRecord>,
    simple_tags: Vec<SimpleTagRecord>,
    data_tags: Vec<DataTagRecord>,
    features: Vec<FeatureRecord>,
}

impl Buckets {
    /// First pass: sort by kind and reject repeated ids.
    fn collect(records: impl IntoIterator<Item = EntityRecord>) -> ModelResult<Self> {
        let mut seen = HashSet::new();
        let mut buckets = Self::default();
        for record in records {
            if !seen.insert(record.id()) {
                return Err(ModelError::DuplicateId(record.id()));
            }
            match record {
                EntityRecord::File(file) => {
                    if buckets.file.is_some() {
                        return Err(ModelError::InvalidData(
                            "snapshot holds more than one file record".to_string(),
                        ));
                    }
                    buckets.file = Some(file);
                }
                EntityRecord::Block(block) => buckets.blocks.push(block),
                EntityRecord::Section(section) => buckets.sections.push(section),
                EntityRecord::Source(source) => buckets.sources.push(source),
                EntityRecord::DataArray(array) => buckets.data_arrays.push(array),
                EntityRecord::SimpleTag(tag) => buckets.simple_tags.push(tag),
                EntityRecord::DataTag(tag) => buckets.data_tags.push(tag),
                EntityRecord::Feature(feature) => buckets.features.push(feature),
            }
        }
        Ok(buckets)
    }
}

fn header_from(record: Option<FileRecord>) -> FileHeader {
    let defaults = FileOptions::default();
    match record {
        Some(record) => FileHeader {
            id: record.id,
            format: record.format,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
            record_commits: defaults.record_commits,
        },
        None => {
            let stamp = now_ms();
            FileHeader {
                id: create_id(),
                format: defaults.format,
                version: defaults.version,
                created_at: stamp,
                updated_at: stamp,
                record_commits: defaults.record_commits,
            }
        }
    }
}

fn dedup(ids: Vec<EntityId>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

impl File {
    /// Flattens the file into records: the file, blocks, sections in
    /// pre-order, then per block its sources, arrays, tags and features.
    pub fn records(&self) -> Vec<EntityRecord> {
        let mut out = vec![EntityRecord::File(FileRecord {
            id: self.header.id,
            format: self.header.format.clone(),
            version: self.header.version,
            created_at: self.header.created_at,
            updated_at: self.header.updated_at,
        })];
        for block in self.blocks.iter() {
            out.push(EntityRecord::Block(BlockRecord {
                meta: block.meta.clone(),
                metadata: block.metadata,
                source_refs: block.source_refs.clone(),
            }));
        }
        for section in self.sections.iter() {
            let parent = self.sections.parent(section.meta.id);
            out.push(EntityRecord::Section(SectionRecord::capture(section, parent)));
        }
        for block in self.blocks.iter() {
            let block_id = block.meta.id;
            for source in block.sources.iter() {
                let parent = block.sources.parent(source.meta.id);
                out.push(EntityRecord::Source(SourceRecord::capture(
                    source, block_id, parent,
                )));
            }
            for array in block.data_arrays.iter() {
                out.push(EntityRecord::DataArray(DataArrayRecord::capture(array, block_id)));
            }
            for tag in block.simple_tags.iter() {
                out.push(EntityRecord::SimpleTag(SimpleTagRecord::capture(tag, block_id)));
            }
            for tag in block.data_tags.iter() {
                out.push(EntityRecord::DataTag(DataTagRecord::capture(tag, block_id)));
            }
            for tag in block.simple_tags.iter() {
                out.extend(tag.features.iter().map(|feature| {
                    EntityRecord::Feature(FeatureRecord::capture(feature, tag.meta.id))
                }));
            }
            for tag in block.data_tags.iter() {
                out.extend(tag.features.iter().map(|feature| {
                    EntityRecord::Feature(FeatureRecord::capture(feature, tag.meta.id))
                }));
            }
        }
        out
    }

    /// Rebuilds a file from `records`, in any order.
    ///
    /// Fails with `DuplicateId` on a repeated id, `NotFound` when an owner,
    /// a referenced array or a referenced source is missing, `InvalidLink`
    /// when a section links to itself or an ancestor, and with the usual
    /// geometry errors when a tag no longer fits its arrays. No commit hook
    /// is installed on the result.
    pub fn load(records: impl IntoIterator<Item = EntityRecord>) -> ModelResult<Self> {
        let buckets = Buckets::collect(records)?;
        let mut file = File::from_header(header_from(buckets.file));

        for record in buckets.blocks {
            let mut block = Block::from_meta(record.meta);
            block.metadata = record.metadata;
            block.source_refs = dedup(record.source_refs);
            let id = file.blocks.insert(block)?;
            file.register(id, Location::top(EntityKind::Block));
        }

        let mut parents = Vec::with_capacity(buckets.sections.len());
        for record in buckets.sections {
            parents.push((record.meta.id, record.parent));
            let section = record.into_section();
            for property in section.properties() {
                property.check_consistency()?;
            }
            let id = file.sections.insert_detached(section)?;
            file.register(id, Location::top(EntityKind::Section));
        }
        for (id, parent) in parents {
            file.sections.attach(id, parent)?;
        }
        for section in file.sections.iter() {
            if let Some(target) = section.link {
                let id = section.meta.id;
                if target == id || file.sections.is_ancestor(target, id) {
                    return Err(ModelError::InvalidLink {
                        section: id,
                        target,
                    });
                }
            }
        }

        let mut source_parents = Vec::with_capacity(buckets.sources.len());
        for record in &buckets.sources {
            let id = file
                .block_mut(record.block)?
                .sources
                .insert_detached(record.to_source())?;
            file.register(id, Location::in_block(EntityKind::Source, record.block));
            source_parents.push((record.block, id, record.parent));
        }
        for (block, id, parent) in source_parents {
            if let Some(parent) = parent {
                if file.locate(parent)?.block != Some(block) {
                    return Err(ModelError::NotFound(parent));
                }
            }
            file.block_mut(block)?.sources.attach(id, parent)?;
        }

        for record in buckets.data_arrays {
            let block = record.block;
            let array = record.into_data_array()?;
            array.check_consistency()?;
            let id = file.block_mut(block)?.data_arrays.insert(array)?;
            file.register(id, Location::in_block(EntityKind::DataArray, block));
        }

        let mut features: HashMap<EntityId, Vec<Feature>> = HashMap::new();
        for record in &buckets.features {
            features
                .entry(record.tag)
                .or_default()
                .push(record.to_feature());
        }

        for record in buckets.simple_tags {
            let mut tag = record.to_bare_tag();
            tag.references = dedup(record.references);
            tag.features = features.remove(&tag.meta.id).unwrap_or_default();
            check_simple_tag(&ArrayView::new(file.block(record.block)?), &tag)?;
            let feature_ids: Vec<EntityId> = tag.features.iter().map(|f| f.id).collect();
            let id = file.block_mut(record.block)?.simple_tags.insert(tag)?;
            file.register(id, Location::in_block(EntityKind::SimpleTag, record.block));
            file.register_features(id, record.block, feature_ids)?;
        }

        for record in buckets.data_tags {
            let mut tag = record.to_bare_tag();
            tag.references = dedup(record.references);
            tag.features = features.remove(&tag.meta.id).unwrap_or_default();
            check_data_tag(&ArrayView::new(file.block(record.block)?), &tag)?;
            let feature_ids: Vec<EntityId> = tag.features.iter().map(|f| f.id).collect();
            let id = file.block_mut(record.block)?.data_tags.insert(tag)?;
            file.register(id, Location::in_block(EntityKind::DataTag, record.block));
            file.register_features(id, record.block, feature_ids)?;
        }

        if let Some(orphan) = features.keys().next() {
            return Err(ModelError::NotFound(*orphan));
        }

        file.check_source_refs()?;
        file.warn_dangling();
        info!(
            "event=file_load module=file status=ok file_id={} entities={}",
            file.header.id,
            file.registry.len()
        );
        Ok(file)
    }

    fn register_features(
        &mut self,
        tag: EntityId,
        block: EntityId,
        features: Vec<EntityId>,
    ) -> ModelResult<()> {
        for feature in features {
            if self.contains(feature) {
                return Err(ModelError::DuplicateId(feature));
            }
            self.register(
                feature,
                Location {
                    kind: EntityKind::Feature,
                    block: Some(block),
                    owner: Some(tag),
                },
            );
        }
        Ok(())
    }

    fn check_source_refs(&self) -> ModelResult<()> {
        let is_source = |id: &EntityId| self.kind_of(*id) == Some(EntityKind::Source);
        for block in self.blocks.iter() {
            let lists = std::iter::once(block.source_refs.as_slice())
                .chain(block.data_arrays.iter().map(|a| a.sources.as_slice()))
                .chain(block.simple_tags.iter().map(|t| t.sources.as_slice()))
                .chain(block.data_tags.iter().map(|t| t.sources.as_slice()));
            for list in lists {
                if let Some(missing) = list.iter().find(|id| !is_source(id)) {
                    return Err(ModelError::NotFound(*missing));
                }
            }
        }
        Ok(())
    }

    fn warn_dangling(&self) {
        for section in self.sections.iter() {
            if let Some(link) = section.link {
                if !self.sections.contains(link) {
                    warn!(
                        "event=file_load module=file status=dangling section_id={} link={}",
                        section.meta.id, link
                    );
                }
            }
        }
        let mut metadata: Vec<(EntityId, EntityId)> = Vec::new();
        for block in self.blocks.iter() {
            metadata.extend(block.metadata.map(|m| (block.meta.id, m)));
            metadata.extend(block.sources.iter().filter_map(|s| s.metadata.map(|m| (s.meta.id, m))));
            metadata.extend(
                block
                    .data_arrays
                    .iter()
                    .filter_map(|a| a.metadata.map(|m| (a.meta.id, m))),
            );
            metadata.extend(
                block
                    .simple_tags
                    .iter()
                    .filter_map(|t| t.metadata.map(|m| (t.meta.id, m))),
            );
            metadata.extend(
                block
                    .data_tags
                    .iter()
                    .filter_map(|t| t.metadata.map(|m| (t.meta.id, m))),
            );
        }
        for (owner, section) in metadata {
            if !self.sections.contains(section) {
                warn!(
                    "event=file_load module=file status=dangling entity_id={} metadata={}",
                    owner, section
                );
            }
        }
    }
}
