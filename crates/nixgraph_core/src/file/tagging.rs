//! Tag, feature and tagged-data operations.
//!
//! # Responsibility
//! - Create and edit simple tags, data tags and features.
//! - Check tag geometry against every referenced array before committing.
//! - Resolve tag positions through dimensions and read the selected data.
//!
//! # Invariants
//! - A simple tag's position (and extent) length equals the rank of every
//!   reference.
//! - A data tag's positions array is numeric with rank 1 or 2; its row
//!   width equals the rank of every reference; extents share its shape.
//! - Tagged features match the tag rank, optionally after a leading
//!   region axis, and contain every region the tag selects. Indexed
//!   bounds are checked at read time.
//! - Referenced and feature arrays live in the tag's block.

use crate::backend::{CommitEvent, Operation};
use crate::error::{ModelError, ModelResult};
use crate::file::{File, Location};
use crate::model::block::Block;
use crate::model::data_array::{ArrayBuffer, DataArray, Region};
use crate::model::dimension::{plain_index, Dimension};
use crate::model::entity::{EntityId, EntityKind};
use crate::model::tag::{DataTag, Feature, LinkType, SimpleTag, Tag};

/// Array lookup inside one block with an optional staged replacement.
pub(crate) struct ArrayView<'a> {
    block: &'a Block,
    staged: Option<&'a DataArray>,
}

impl<'a> ArrayView<'a> {
    pub(crate) fn new(block: &'a Block) -> Self {
        Self {
            block,
            staged: None,
        }
    }

    pub(crate) fn with_staged(block: &'a Block, staged: &'a DataArray) -> Self {
        Self {
            block,
            staged: Some(staged),
        }
    }

    fn get(&self, id: EntityId) -> ModelResult<&'a DataArray> {
        if let Some(staged) = self.staged {
            if staged.meta.id == id {
                return Ok(staged);
            }
        }
        self.block
            .data_arrays
            .get(id)
            .ok_or(ModelError::NotFound(id))
    }
}

#[derive(Clone, Copy)]
enum TagGeometry<'t> {
    Single {
        position: &'t [f64],
        extent: Option<&'t [f64]>,
    },
    Regions(&'t RegionTable),
}

/// Decoded positions/extents of a data tag.
struct RegionTable {
    count: usize,
    width: usize,
    positions: Vec<f64>,
    extents: Option<Vec<f64>>,
}

impl RegionTable {
    fn build(positions: &DataArray, extents: Option<&DataArray>) -> ModelResult<Self> {
        let position_values = positions.data().to_f64_vec().ok_or(ModelError::TypeMismatch {
            expected: "numeric",
            actual: positions.data_type().as_str(),
        })?;
        let (count, width) = match positions.shape() {
            [count] => (*count, 1),
            [count, width] => (*count, *width),
            shape => {
                return Err(ModelError::ShapeMismatch {
                    expected: 2,
                    actual: shape.len(),
                })
            }
        };
        let extent_values = match extents {
            Some(extents) => {
                if extents.rank() != positions.rank() {
                    return Err(ModelError::ShapeMismatch {
                        expected: positions.rank(),
                        actual: extents.rank(),
                    });
                }
                if let Some((expected, actual)) = positions
                    .shape()
                    .iter()
                    .zip(extents.shape())
                    .find(|(expected, actual)| expected != actual)
                {
                    return Err(ModelError::ShapeMismatch {
                        expected: *expected,
                        actual: *actual,
                    });
                }
                Some(extents.data().to_f64_vec().ok_or(ModelError::TypeMismatch {
                    expected: "numeric",
                    actual: extents.data_type().as_str(),
                })?)
            }
            None => None,
        };
        Ok(Self {
            count,
            width,
            positions: position_values,
            extents: extent_values,
        })
    }

    fn region(&self, index: usize) -> ModelResult<(Vec<f64>, Option<Vec<f64>>)> {
        if index >= self.count {
            return Err(ModelError::OutOfBounds(format!(
                "region {index} of {} regions",
                self.count
            )));
        }
        let rows = index * self.width..(index + 1) * self.width;
        Ok((
            self.positions[rows.clone()].to_vec(),
            self.extents.as_ref().map(|extents| extents[rows].to_vec()),
        ))
    }
}

fn check_rank(array: &DataArray, rank: usize) -> ModelResult<()> {
    if array.rank() != rank {
        return Err(ModelError::ShapeMismatch {
            expected: array.rank(),
            actual: rank,
        });
    }
    Ok(())
}

/// Checks that the region a tagged feature would read stays inside it.
fn check_tagged_fit(
    array: &DataArray,
    axis_offset: usize,
    position: &[f64],
    extent: Option<&[f64]>,
) -> ModelResult<()> {
    let region = selection(array, axis_offset, position, extent)?;
    for ((offset, count), bound) in region.offset.iter().zip(&region.extent).zip(array.shape()) {
        let end = offset.saturating_add(*count);
        if end > *bound {
            return Err(ModelError::ShapeMismatch {
                expected: *bound,
                actual: end,
            });
        }
    }
    Ok(())
}

fn check_feature(view: &ArrayView<'_>, geometry: TagGeometry<'_>, feature: &Feature) -> ModelResult<()> {
    let array = view.get(feature.data)?;
    if feature.link_type != LinkType::Tagged {
        return Ok(());
    }
    match geometry {
        TagGeometry::Single { position, extent } => {
            check_rank(array, position.len())?;
            check_tagged_fit(array, 0, position, extent)
        }
        TagGeometry::Regions(table) => {
            let axis_offset = if array.rank() == table.width {
                0
            } else if array.rank() == table.width + 1 {
                if array.shape()[0] != table.count {
                    return Err(ModelError::ShapeMismatch {
                        expected: table.count,
                        actual: array.shape()[0],
                    });
                }
                1
            } else {
                return Err(ModelError::ShapeMismatch {
                    expected: table.width,
                    actual: array.rank(),
                });
            };
            for index in 0..table.count {
                let (position, extent) = table.region(index)?;
                check_tagged_fit(array, axis_offset, &position, extent.as_deref())?;
            }
            Ok(())
        }
    }
}

pub(crate) fn check_simple_tag(view: &ArrayView<'_>, tag: &SimpleTag) -> ModelResult<()> {
    let rank = tag.position.len();
    if let Some(extent) = &tag.extent {
        if extent.len() != rank {
            return Err(ModelError::ShapeMismatch {
                expected: rank,
                actual: extent.len(),
            });
        }
    }
    if !tag.units.is_empty() && tag.units.len() != rank {
        return Err(ModelError::ShapeMismatch {
            expected: rank,
            actual: tag.units.len(),
        });
    }
    for reference in &tag.references {
        check_rank(view.get(*reference)?, rank)?;
    }
    let geometry = TagGeometry::Single {
        position: &tag.position,
        extent: tag.extent.as_deref(),
    };
    for feature in &tag.features {
        check_feature(view, geometry, feature)?;
    }
    Ok(())
}

pub(crate) fn check_data_tag(view: &ArrayView<'_>, tag: &DataTag) -> ModelResult<()> {
    let positions = view.get(tag.positions)?;
    let extents = tag.extents.map(|id| view.get(id)).transpose()?;
    let table = RegionTable::build(positions, extents)?;
    for reference in &tag.references {
        check_rank(view.get(*reference)?, table.width)?;
    }
    for feature in &tag.features {
        check_feature(view, TagGeometry::Regions(&table), feature)?;
    }
    Ok(())
}

fn axis_index(dimension: Option<&Dimension>, position: f64) -> ModelResult<usize> {
    match dimension {
        Some(dimension) => dimension.index_of(position),
        None => plain_index(position),
    }
}

/// Region of `array` selected by `position`/`extent` on the axes starting
/// at `axis_offset`. Leading axes select index 0 with extent 1.
fn selection(
    array: &DataArray,
    axis_offset: usize,
    position: &[f64],
    extent: Option<&[f64]>,
) -> ModelResult<Region> {
    if axis_offset + position.len() != array.rank() {
        return Err(ModelError::ShapeMismatch {
            expected: array.rank(),
            actual: axis_offset + position.len(),
        });
    }
    let mut offset = vec![0; array.rank()];
    let mut counts = vec![1; array.rank()];
    for (i, start_position) in position.iter().enumerate() {
        let axis = axis_offset + i;
        let dimension = array.dimension(axis);
        let start = axis_index(dimension, *start_position)?;
        let count = match extent {
            Some(extent) => {
                let end = axis_index(dimension, start_position + extent[i])?;
                if end < start {
                    return Err(ModelError::OutOfBounds(format!(
                        "axis {axis}: extent ends before it starts"
                    )));
                }
                end - start + 1
            }
            None => 1,
        };
        offset[axis] = start;
        counts[axis] = count;
    }
    Ok(Region::new(offset, counts))
}

fn indexed_slice(array: &DataArray, index: usize) -> ModelResult<Region> {
    let rows = array.shape()[0];
    if index >= rows {
        return Err(ModelError::OutOfBounds(format!(
            "index {index} exceeds {rows} entries of the feature array"
        )));
    }
    let mut region = Region::full(array.shape());
    region.offset[0] = index;
    region.extent[0] = 1;
    Ok(region)
}

impl File {
    pub fn simple_tag(&self, id: EntityId) -> ModelResult<&SimpleTag> {
        let location = self.locate_kind(id, EntityKind::SimpleTag)?;
        self.block_at(location, id)?
            .simple_tags
            .get(id)
            .ok_or(ModelError::NotFound(id))
    }

    pub fn data_tag(&self, id: EntityId) -> ModelResult<&DataTag> {
        let location = self.locate_kind(id, EntityKind::DataTag)?;
        self.block_at(location, id)?
            .data_tags
            .get(id)
            .ok_or(ModelError::NotFound(id))
    }

    pub fn feature(&self, id: EntityId) -> ModelResult<&Feature> {
        let location = self.locate_kind(id, EntityKind::Feature)?;
        let tag = location.owner.ok_or(ModelError::NotFound(id))?;
        let block = self.block_at(location, id)?;
        let found = match self.kind_of(tag) {
            Some(EntityKind::SimpleTag) => block.simple_tags.get(tag).and_then(|t| t.feature(id)),
            Some(EntityKind::DataTag) => block.data_tags.get(tag).and_then(|t| t.feature(id)),
            _ => None,
        };
        found.ok_or(ModelError::NotFound(id))
    }

    pub(crate) fn feature_mut(&mut self, id: EntityId) -> ModelResult<&mut Feature> {
        let location = self.locate_kind(id, EntityKind::Feature)?;
        let tag = location.owner.ok_or(ModelError::NotFound(id))?;
        let tag_kind = self.kind_of(tag);
        let block = self.block_mut_at(location, id)?;
        let features = match tag_kind {
            Some(EntityKind::SimpleTag) => block.simple_tags.get_mut(tag).map(|t| &mut t.features),
            Some(EntityKind::DataTag) => block.data_tags.get_mut(tag).map(|t| &mut t.features),
            _ => None,
        };
        features
            .and_then(|features| features.iter_mut().find(|feature| feature.id == id))
            .ok_or(ModelError::NotFound(id))
    }

    pub(crate) fn locate_kind(&self, id: EntityId, kind: EntityKind) -> ModelResult<Location> {
        let location = self.locate(id)?;
        if location.kind != kind {
            return Err(ModelError::TypeMismatch {
                expected: kind.as_str(),
                actual: location.kind.as_str(),
            });
        }
        Ok(location)
    }

    /// Creates a simple tag at `position` in `block`, without references.
    pub fn create_simple_tag(
        &mut self,
        block: EntityId,
        name: &str,
        tag_type: Option<&str>,
        position: Vec<f64>,
    ) -> ModelResult<EntityId> {
        let tag = SimpleTag::new(name, tag_type, position)?;
        let id = self.block_mut(block)?.simple_tags.insert(tag)?;
        self.register(id, Location::in_block(EntityKind::SimpleTag, block));
        self.commit(id, EntityKind::SimpleTag, Operation::Create, None)?;
        Ok(id)
    }

    /// Creates a data tag whose regions are the rows of `positions`.
    pub fn create_data_tag(
        &mut self,
        block: EntityId,
        name: &str,
        tag_type: Option<&str>,
        positions: EntityId,
    ) -> ModelResult<EntityId> {
        let owner = self.block(block)?;
        let tag = DataTag::new(name, tag_type, positions)?;
        check_data_tag(&ArrayView::new(owner), &tag)?;
        let id = self.block_mut(block)?.data_tags.insert(tag)?;
        self.register(id, Location::in_block(EntityKind::DataTag, block));
        self.commit(id, EntityKind::DataTag, Operation::Create, None)?;
        Ok(id)
    }

    /// Deletes a simple or data tag with its features. Referenced arrays stay.
    pub fn delete_tag(&mut self, id: EntityId) -> ModelResult<()> {
        let location = self.locate(id)?;
        let block = self.block_mut_at(location, id)?;
        let features: Vec<EntityId> = match location.kind {
            EntityKind::SimpleTag => block
                .simple_tags
                .remove(id)
                .map(|tag| tag.features.iter().map(|f| f.id).collect()),
            EntityKind::DataTag => block
                .data_tags
                .remove(id)
                .map(|tag| tag.features.iter().map(|f| f.id).collect()),
            other => return Err(not_a_tag(other)),
        }
        .ok_or(ModelError::NotFound(id))?;

        self.registry.remove(&id);
        let mut events = Vec::with_capacity(features.len() + 1);
        for feature in features {
            self.registry.remove(&feature);
            events.push(CommitEvent {
                entity_id: feature,
                kind: EntityKind::Feature,
                operation: Operation::Delete,
                field: None,
            });
        }
        events.push(CommitEvent {
            entity_id: id,
            kind: location.kind,
            operation: Operation::Delete,
            field: None,
        });
        self.commit_all(events)
    }

    /// Edits a copy of a simple tag and commits it if its geometry still holds.
    pub(crate) fn update_simple_tag<R>(
        &mut self,
        id: EntityId,
        field: &'static str,
        edit: impl FnOnce(&mut SimpleTag) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let location = self.locate_kind(id, EntityKind::SimpleTag)?;
        let block = self.block_at(location, id)?;
        let mut staged = block
            .simple_tags
            .get(id)
            .ok_or(ModelError::NotFound(id))?
            .clone();
        let result = edit(&mut staged)?;
        check_simple_tag(&ArrayView::new(block), &staged)?;
        staged.meta.touch();
        if let Some(slot) = self.block_mut_at(location, id)?.simple_tags.get_mut(id) {
            *slot = staged;
        }
        self.commit(id, EntityKind::SimpleTag, Operation::Update, Some(field))?;
        Ok(result)
    }

    /// Edits a copy of a data tag and commits it if its geometry still holds.
    pub(crate) fn update_data_tag<R>(
        &mut self,
        id: EntityId,
        field: &'static str,
        edit: impl FnOnce(&mut DataTag) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let location = self.locate_kind(id, EntityKind::DataTag)?;
        let block = self.block_at(location, id)?;
        let mut staged = block
            .data_tags
            .get(id)
            .ok_or(ModelError::NotFound(id))?
            .clone();
        let result = edit(&mut staged)?;
        check_data_tag(&ArrayView::new(block), &staged)?;
        staged.meta.touch();
        if let Some(slot) = self.block_mut_at(location, id)?.data_tags.get_mut(id) {
            *slot = staged;
        }
        self.commit(id, EntityKind::DataTag, Operation::Update, Some(field))?;
        Ok(result)
    }

    /// Edits the reference and feature lists of either tag kind.
    fn update_tag<R>(
        &mut self,
        id: EntityId,
        field: &'static str,
        edit: impl FnOnce(&mut Vec<EntityId>, &mut Vec<Feature>) -> ModelResult<R>,
    ) -> ModelResult<R> {
        match self.locate(id)?.kind {
            EntityKind::SimpleTag => self.update_simple_tag(id, field, |tag| {
                edit(&mut tag.references, &mut tag.features)
            }),
            EntityKind::DataTag => self.update_data_tag(id, field, |tag| {
                edit(&mut tag.references, &mut tag.features)
            }),
            other => Err(not_a_tag(other)),
        }
    }

    pub fn set_tag_position(&mut self, tag: EntityId, position: Vec<f64>) -> ModelResult<()> {
        self.update_simple_tag(tag, "position", |staged| {
            staged.position = position;
            Ok(())
        })
    }

    pub fn set_tag_extent(&mut self, tag: EntityId, extent: Option<Vec<f64>>) -> ModelResult<()> {
        self.update_simple_tag(tag, "extent", |staged| {
            staged.extent = extent;
            Ok(())
        })
    }

    /// Sets per-axis units; an empty list clears them.
    pub fn set_tag_units(&mut self, tag: EntityId, units: Vec<String>) -> ModelResult<()> {
        self.update_simple_tag(tag, "units", |staged| {
            staged.units = units;
            Ok(())
        })
    }

    pub fn set_data_tag_positions(&mut self, tag: EntityId, positions: EntityId) -> ModelResult<()> {
        self.update_data_tag(tag, "positions", |staged| {
            staged.positions = positions;
            Ok(())
        })
    }

    pub fn set_data_tag_extents(&mut self, tag: EntityId, extents: Option<EntityId>) -> ModelResult<()> {
        self.update_data_tag(tag, "extents", |staged| {
            staged.extents = extents;
            Ok(())
        })
    }

    /// Tags `array`; a no-op if already referenced.
    ///
    /// Fails with `ShapeMismatch` when the array rank differs from the tag
    /// rank and with `NotFound` when the array is not in the tag's block.
    pub fn attach_reference(&mut self, tag: EntityId, array: EntityId) -> ModelResult<()> {
        let kind = self.locate(tag)?.kind;
        let already = match kind {
            EntityKind::SimpleTag => self.simple_tag(tag)?.has_reference(array),
            EntityKind::DataTag => self.data_tag(tag)?.has_reference(array),
            other => return Err(not_a_tag(other)),
        };
        if already {
            return Ok(());
        }
        self.update_tag(tag, "references", |references, _| {
            references.push(array);
            Ok(())
        })
    }

    /// Stops tagging `array`; the array itself is untouched. Returns whether
    /// it was referenced.
    pub fn detach_reference(&mut self, tag: EntityId, array: EntityId) -> ModelResult<bool> {
        let kind = self.locate(tag)?.kind;
        let present = match kind {
            EntityKind::SimpleTag => self.simple_tag(tag)?.has_reference(array),
            EntityKind::DataTag => self.data_tag(tag)?.has_reference(array),
            other => return Err(not_a_tag(other)),
        };
        if !present {
            return Ok(false);
        }
        self.update_tag(tag, "references", |references, _| {
            references.retain(|existing| *existing != array);
            Ok(true)
        })
    }

    /// Links `array` to `tag` as a feature.
    pub fn create_feature(
        &mut self,
        tag: EntityId,
        array: EntityId,
        link_type: LinkType,
    ) -> ModelResult<EntityId> {
        let location = self.locate(tag)?;
        let feature = Feature::new(link_type, array);
        let id = feature.id;
        if self.contains(id) {
            return Err(ModelError::DuplicateId(id));
        }
        self.update_tag(tag, "features", |_, features| {
            features.push(feature);
            Ok(())
        })?;
        self.register(
            id,
            Location {
                kind: EntityKind::Feature,
                block: location.block,
                owner: Some(tag),
            },
        );
        self.commit(id, EntityKind::Feature, Operation::Create, None)?;
        Ok(id)
    }

    pub fn delete_feature(&mut self, id: EntityId) -> ModelResult<()> {
        let location = self.locate_kind(id, EntityKind::Feature)?;
        let tag = location.owner.ok_or(ModelError::NotFound(id))?;
        self.update_tag(tag, "features", |_, features| {
            features.retain(|feature| feature.id != id);
            Ok(())
        })?;
        self.registry.remove(&id);
        self.commit(id, EntityKind::Feature, Operation::Delete, None)
    }

    pub fn set_feature_link_type(&mut self, id: EntityId, link_type: LinkType) -> ModelResult<()> {
        self.update_feature(id, "link_type", |feature| feature.link_type = link_type)
    }

    pub fn set_feature_data(&mut self, id: EntityId, array: EntityId) -> ModelResult<()> {
        self.update_feature(id, "data", |feature| feature.data = array)
    }

    fn update_feature(
        &mut self,
        id: EntityId,
        field: &'static str,
        edit: impl FnOnce(&mut Feature),
    ) -> ModelResult<()> {
        let location = self.locate_kind(id, EntityKind::Feature)?;
        let tag = location.owner.ok_or(ModelError::NotFound(id))?;
        self.update_tag(tag, "features", |_, features| {
            let feature = features
                .iter_mut()
                .find(|feature| feature.id == id)
                .ok_or(ModelError::NotFound(id))?;
            edit(feature);
            feature.touch();
            Ok(())
        })?;
        self.commit(id, EntityKind::Feature, Operation::Update, Some(field))
    }

    /// Number of regions of a data tag.
    pub fn region_count(&self, tag: EntityId) -> ModelResult<usize> {
        Ok(self.region_table(tag)?.count)
    }

    fn region_table(&self, tag: EntityId) -> ModelResult<RegionTable> {
        let location = self.locate_kind(tag, EntityKind::DataTag)?;
        let block = self.block_at(location, tag)?;
        let data_tag = block.data_tags.get(tag).ok_or(ModelError::NotFound(tag))?;
        let view = ArrayView::new(block);
        let extents = data_tag.extents.map(|id| view.get(id)).transpose()?;
        RegionTable::build(view.get(data_tag.positions)?, extents)
    }

    fn tag_array(&self, tag: EntityId, array: EntityId) -> ModelResult<&DataArray> {
        let location = self.locate(tag)?;
        ArrayView::new(self.block_at(location, tag)?).get(array)
    }

    /// Data of the `reference_index`-th reference inside a simple tag's region.
    pub fn tagged_data(&self, tag: EntityId, reference_index: usize) -> ModelResult<ArrayBuffer> {
        let simple = self.simple_tag(tag)?;
        let reference = nth_reference(simple, reference_index)?;
        let array = self.tag_array(tag, reference)?;
        let region = selection(array, 0, &simple.position, simple.extent.as_deref())?;
        array.read_region(&region)
    }

    /// Data of the `reference_index`-th reference inside one data tag region.
    pub fn tagged_region_data(
        &self,
        tag: EntityId,
        region_index: usize,
        reference_index: usize,
    ) -> ModelResult<ArrayBuffer> {
        let data_tag = self.data_tag(tag)?;
        let reference = nth_reference(data_tag, reference_index)?;
        let (position, extent) = self.region_table(tag)?.region(region_index)?;
        let array = self.tag_array(tag, reference)?;
        let region = selection(array, 0, &position, extent.as_deref())?;
        array.read_region(&region)
    }

    /// Feature data selected by the tag according to the link type.
    ///
    /// `region` picks the data tag region and is ignored for simple tags.
    pub fn feature_data(
        &self,
        tag: EntityId,
        feature: EntityId,
        region: usize,
    ) -> ModelResult<ArrayBuffer> {
        let location = self.locate_kind(feature, EntityKind::Feature)?;
        if location.owner != Some(tag) {
            return Err(ModelError::NotFound(feature));
        }
        let link = self.feature(feature)?;
        let array = self.tag_array(tag, link.data)?;

        let selected = match (self.locate(tag)?.kind, link.link_type) {
            (_, LinkType::Untagged) => return Ok(array.data().clone()),
            (EntityKind::SimpleTag, LinkType::Tagged) => {
                let simple = self.simple_tag(tag)?;
                selection(array, 0, &simple.position, simple.extent.as_deref())?
            }
            (EntityKind::SimpleTag, LinkType::Indexed) => {
                let simple = self.simple_tag(tag)?;
                let first = simple.position.first().copied().ok_or_else(|| {
                    ModelError::OutOfBounds("tag has an empty position".to_string())
                })?;
                indexed_slice(array, plain_index(first)?)?
            }
            (EntityKind::DataTag, LinkType::Tagged) => {
                let table = self.region_table(tag)?;
                let (position, extent) = table.region(region)?;
                if array.rank() == table.width + 1 {
                    let mut selected = selection(array, 1, &position, extent.as_deref())?;
                    selected.offset[0] = region;
                    selected
                } else {
                    selection(array, 0, &position, extent.as_deref())?
                }
            }
            (EntityKind::DataTag, LinkType::Indexed) => {
                let count = self.region_table(tag)?.count;
                if region >= count {
                    return Err(ModelError::OutOfBounds(format!(
                        "region {region} of {count} regions"
                    )));
                }
                indexed_slice(array, region)?
            }
            (other, _) => return Err(not_a_tag(other)),
        };
        array.read_region(&selected)
    }

    /// Re-checks every tag in `block` that touches `staged.id`, as if
    /// `staged` replaced the stored array.
    pub(crate) fn check_tags_touching(&self, block: &Block, staged: &DataArray) -> ModelResult<()> {
        let id = staged.meta.id;
        let view = ArrayView::with_staged(block, staged);
        for tag in block.simple_tags.iter() {
            if tag.references.contains(&id) || tag.features.iter().any(|f| f.data == id) {
                check_simple_tag(&view, tag)?;
            }
        }
        for tag in block.data_tags.iter() {
            let touches = tag.positions == id
                || tag.extents == Some(id)
                || tag.references.contains(&id)
                || tag.features.iter().any(|f| f.data == id);
            if touches {
                check_data_tag(&view, tag)?;
            }
        }
        Ok(())
    }
}

fn nth_reference<T: Tag>(tag: &T, index: usize) -> ModelResult<EntityId> {
    tag.references().get(index).copied().ok_or_else(|| {
        ModelError::OutOfBounds(format!(
            "reference {index} of {} references",
            tag.references().len()
        ))
    })
}

fn not_a_tag(kind: EntityKind) -> ModelError {
    ModelError::TypeMismatch {
        expected: "tag",
        actual: kind.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ModelError;
    use crate::file::File;
    use crate::model::data_array::{ArrayBuffer, DataType};
    use crate::model::dimension::SampledDimension;
    use crate::model::tag::LinkType;

    fn file_with_block() -> (File, uuid::Uuid) {
        let mut file = File::new();
        let block = file.create_block("session", None).unwrap();
        (file, block)
    }

    #[test]
    fn simple_tag_rank_must_match_reference() {
        let (mut file, block) = file_with_block();
        let array = file
            .create_data_array(block, "signal", None, DataType::Double, vec![10, 20])
            .unwrap();
        let bad = file
            .create_simple_tag(block, "bad", None, vec![1.0, 1.0, 1.0])
            .unwrap();
        assert!(matches!(
            file.attach_reference(bad, array),
            Err(ModelError::ShapeMismatch { .. })
        ));
        assert!(file.simple_tag(bad).unwrap().references.is_empty());

        let good = file
            .create_simple_tag(block, "good", None, vec![5.0, 5.0])
            .unwrap();
        file.attach_reference(good, array).unwrap();
        file.attach_reference(good, array).unwrap();
        assert_eq!(file.simple_tag(good).unwrap().references.len(), 1);
        assert!(file.set_tag_position(good, vec![1.0]).is_err());
    }

    #[test]
    fn tagged_data_resolves_positions_through_dimensions() {
        let (mut file, block) = file_with_block();
        let array = file
            .create_data_array(block, "trace", None, DataType::Double, vec![10])
            .unwrap();
        file.write_all(array, (0..10).map(f64::from).collect::<Vec<_>>().into())
            .unwrap();
        file.append_dimension(array, SampledDimension::new(0.5).unwrap().into())
            .unwrap();

        let tag = file
            .create_simple_tag(block, "window", None, vec![1.0])
            .unwrap();
        file.set_tag_extent(tag, Some(vec![1.0])).unwrap();
        file.attach_reference(tag, array).unwrap();

        let data = file.tagged_data(tag, 0).unwrap();
        assert_eq!(data, ArrayBuffer::Double(vec![2.0, 3.0, 4.0]));
        assert!(matches!(
            file.tagged_data(tag, 1),
            Err(ModelError::OutOfBounds(_))
        ));
    }

    #[test]
    fn data_tag_regions_and_features() {
        let (mut file, block) = file_with_block();
        let signal = file
            .create_data_array(block, "signal", None, DataType::Int, vec![6])
            .unwrap();
        file.write_all(signal, vec![10_i64, 11, 12, 13, 14, 15].into())
            .unwrap();
        let positions = file
            .create_data_array(block, "positions", None, DataType::Double, vec![2, 1])
            .unwrap();
        file.write_all(positions, vec![1.0, 4.0].into()).unwrap();
        let extents = file
            .create_data_array(block, "extents", None, DataType::Double, vec![2, 1])
            .unwrap();
        file.write_all(extents, vec![1.0, 0.0].into()).unwrap();
        let labels = file
            .create_data_array(block, "labels", None, DataType::String, vec![2])
            .unwrap();
        file.write_all(labels, vec!["a".to_string(), "b".to_string()].into())
            .unwrap();

        let tag = file
            .create_data_tag(block, "events", None, positions)
            .unwrap();
        file.set_data_tag_extents(tag, Some(extents)).unwrap();
        file.attach_reference(tag, signal).unwrap();
        assert_eq!(file.region_count(tag).unwrap(), 2);
        assert_eq!(
            file.tagged_region_data(tag, 0, 0).unwrap(),
            ArrayBuffer::Int(vec![11, 12])
        );
        assert_eq!(
            file.tagged_region_data(tag, 1, 0).unwrap(),
            ArrayBuffer::Int(vec![14])
        );

        let feature = file
            .create_feature(tag, labels, LinkType::Indexed)
            .unwrap();
        assert_eq!(
            file.feature_data(tag, feature, 1).unwrap(),
            ArrayBuffer::String(vec!["b".to_string()])
        );
        assert!(matches!(
            file.feature_data(tag, feature, 2),
            Err(ModelError::OutOfBounds(_))
        ));
    }

    #[test]
    fn tagged_feature_rank_is_checked() {
        let (mut file, block) = file_with_block();
        let signal = file
            .create_data_array(block, "signal", None, DataType::Double, vec![4, 4])
            .unwrap();
        let flat = file
            .create_data_array(block, "flat", None, DataType::Double, vec![4])
            .unwrap();
        let tag = file
            .create_simple_tag(block, "roi", None, vec![0.0, 0.0])
            .unwrap();
        assert!(matches!(
            file.create_feature(tag, flat, LinkType::Tagged),
            Err(ModelError::ShapeMismatch { .. })
        ));
        let feature = file.create_feature(tag, flat, LinkType::Untagged).unwrap();
        assert!(file.set_feature_link_type(feature, LinkType::Tagged).is_err());
        assert_eq!(
            file.feature(feature).unwrap().link_type(),
            LinkType::Untagged
        );
        file.create_feature(tag, signal, LinkType::Tagged).unwrap();
    }

    #[test]
    fn tagged_feature_must_cover_the_extent() {
        let (mut file, block) = file_with_block();
        let trace = file
            .create_data_array(block, "trace", None, DataType::Double, vec![6])
            .unwrap();
        let short = file
            .create_data_array(block, "short", None, DataType::Double, vec![3])
            .unwrap();
        let tag = file.create_simple_tag(block, "stim", None, vec![1.0]).unwrap();
        file.set_tag_extent(tag, Some(vec![2.0])).unwrap();
        assert!(matches!(
            file.create_feature(tag, short, LinkType::Tagged),
            Err(ModelError::ShapeMismatch { expected: 3, actual: 4 })
        ));
        assert!(file.simple_tag(tag).unwrap().features.is_empty());

        file.set_tag_extent(tag, Some(vec![1.0])).unwrap();
        file.create_feature(tag, short, LinkType::Tagged).unwrap();
        file.create_feature(tag, trace, LinkType::Tagged).unwrap();
        assert!(matches!(
            file.set_tag_extent(tag, Some(vec![2.0])),
            Err(ModelError::ShapeMismatch { .. })
        ));
        assert_eq!(file.simple_tag(tag).unwrap().extent(), Some(&[1.0][..]));
    }
}
