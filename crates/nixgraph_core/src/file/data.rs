//! Data array operations on the file facade.
//!
//! # Responsibility
//! - Create, edit and delete data arrays inside a block.
//! - Route buffer I/O and dimension edits through one commit path.
//!
//! # Invariants
//! - An array still referenced by a tag, a feature or a data tag's
//!   positions/extents cannot be deleted.
//! - A reshape is rejected when any tag touching the array would lose
//!   its geometry.

use crate::backend::Operation;
use crate::error::{ModelError, ModelResult};
use crate::file::{File, Location};
use crate::model::block::Block;
use crate::model::data_array::{ArrayBuffer, DataArray, DataType, Region};
use crate::model::dimension::{Dimension, RangeDimension, SampledDimension, SetDimension};
use crate::model::entity::{EntityId, EntityKind};
use log::info;

/// First tag or feature in `block` that still points at `array`.
fn referrer_of(block: &Block, array: EntityId) -> Option<EntityId> {
    for tag in block.simple_tags.iter() {
        if tag.references.contains(&array) {
            return Some(tag.meta.id);
        }
        if let Some(feature) = tag.features.iter().find(|f| f.data == array) {
            return Some(feature.id);
        }
    }
    for tag in block.data_tags.iter() {
        if tag.positions == array || tag.extents == Some(array) || tag.references.contains(&array) {
            return Some(tag.meta.id);
        }
        if let Some(feature) = tag.features.iter().find(|f| f.data == array) {
            return Some(feature.id);
        }
    }
    None
}

impl File {
    pub fn data_array(&self, id: EntityId) -> ModelResult<&DataArray> {
        let location = self.locate_kind(id, EntityKind::DataArray)?;
        self.block_at(location, id)?
            .data_arrays
            .get(id)
            .ok_or(ModelError::NotFound(id))
    }

    fn data_array_mut(&mut self, id: EntityId) -> ModelResult<&mut DataArray> {
        let location = self.locate_kind(id, EntityKind::DataArray)?;
        self.block_mut_at(location, id)?
            .data_arrays
            .get_mut(id)
            .ok_or(ModelError::NotFound(id))
    }

    /// Runs an atomic `DataArray` edit and commits it under `field`.
    fn update_data_array<R>(
        &mut self,
        id: EntityId,
        field: &'static str,
        edit: impl FnOnce(&mut DataArray) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let result = edit(self.data_array_mut(id)?)?;
        self.commit(id, EntityKind::DataArray, Operation::Update, Some(field))?;
        Ok(result)
    }

    /// Creates a zero-filled array of `shape` in `block`.
    pub fn create_data_array(
        &mut self,
        block: EntityId,
        name: &str,
        array_type: Option<&str>,
        data_type: DataType,
        shape: Vec<usize>,
    ) -> ModelResult<EntityId> {
        let array = DataArray::new(name, array_type, data_type, shape)?;
        let id = self.block_mut(block)?.data_arrays.insert(array)?;
        self.register(id, Location::in_block(EntityKind::DataArray, block));
        self.commit(id, EntityKind::DataArray, Operation::Create, None)?;
        Ok(id)
    }

    /// Deletes an array nothing references any more.
    pub fn delete_data_array(&mut self, id: EntityId) -> ModelResult<()> {
        let location = self.locate_kind(id, EntityKind::DataArray)?;
        let block = self.block_at(location, id)?;
        if let Some(referrer) = referrer_of(block, id) {
            return Err(ModelError::ReferencedEntity { id, referrer });
        }
        self.block_mut_at(location, id)?
            .data_arrays
            .remove(id)
            .ok_or(ModelError::NotFound(id))?;
        self.registry.remove(&id);
        info!(
            "event=data_array_delete module=file status=ok data_array_id={}",
            id
        );
        self.commit(id, EntityKind::DataArray, Operation::Delete, None)
    }

    pub fn read_region(&self, id: EntityId, region: &Region) -> ModelResult<ArrayBuffer> {
        self.data_array(id)?.read_region(region)
    }

    pub fn read_all(&self, id: EntityId) -> ModelResult<ArrayBuffer> {
        Ok(self.data_array(id)?.data().clone())
    }

    /// Numeric read with the array's polynomial calibration applied.
    pub fn read_calibrated(&self, id: EntityId, region: &Region) -> ModelResult<Vec<f64>> {
        self.data_array(id)?.read_calibrated(region)
    }

    pub fn write_region(
        &mut self,
        id: EntityId,
        region: &Region,
        values: ArrayBuffer,
    ) -> ModelResult<()> {
        self.update_data_array(id, "data", |array| array.write_region(region, values))
    }

    pub fn write_all(&mut self, id: EntityId, values: ArrayBuffer) -> ModelResult<()> {
        self.update_data_array(id, "data", |array| array.write_all(values))
    }

    /// Resizes the array, keeping overlapping content.
    ///
    /// The new shape must fit every dimension descriptor and every tag or
    /// feature that uses the array.
    pub fn set_data_array_shape(&mut self, id: EntityId, shape: Vec<usize>) -> ModelResult<()> {
        let location = self.locate_kind(id, EntityKind::DataArray)?;
        let block = self.block_at(location, id)?;
        let mut staged = block
            .data_arrays
            .get(id)
            .ok_or(ModelError::NotFound(id))?
            .clone();
        staged.set_shape(shape)?;
        self.check_tags_touching(block, &staged)?;
        if let Some(slot) = self.block_mut_at(location, id)?.data_arrays.get_mut(id) {
            *slot = staged;
        }
        self.commit(id, EntityKind::DataArray, Operation::Update, Some("shape"))
    }

    pub fn set_data_array_label(&mut self, id: EntityId, label: Option<&str>) -> ModelResult<()> {
        self.update_data_array(id, "label", |array| {
            array.set_label(label);
            Ok(())
        })
    }

    /// Sets the unit; whitespace is stripped and micro signs become `u`.
    pub fn set_data_array_unit(&mut self, id: EntityId, unit: Option<&str>) -> ModelResult<()> {
        self.update_data_array(id, "unit", |array| {
            array.set_unit(unit);
            Ok(())
        })
    }

    pub fn set_expansion_origin(&mut self, id: EntityId, origin: Option<f64>) -> ModelResult<()> {
        self.update_data_array(id, "expansion_origin", |array| {
            array.set_expansion_origin(origin);
            Ok(())
        })
    }

    pub fn set_polynom_coefficients(
        &mut self,
        id: EntityId,
        coefficients: Vec<f64>,
    ) -> ModelResult<()> {
        self.update_data_array(id, "polynom_coefficients", |array| {
            array.set_polynom_coefficients(coefficients);
            Ok(())
        })
    }

    /// Describes the next undescribed axis; returns its index.
    pub fn append_dimension(&mut self, id: EntityId, dimension: Dimension) -> ModelResult<usize> {
        self.update_data_array(id, "dimensions", |array| array.append_dimension(dimension))
    }

    pub fn append_sampled_dimension(
        &mut self,
        id: EntityId,
        sampling_interval: f64,
    ) -> ModelResult<usize> {
        let dimension = SampledDimension::new(sampling_interval)?;
        self.append_dimension(id, dimension.into())
    }

    pub fn append_range_dimension(&mut self, id: EntityId, ticks: Vec<f64>) -> ModelResult<usize> {
        let dimension = RangeDimension::new(ticks)?;
        self.append_dimension(id, dimension.into())
    }

    pub fn append_set_dimension(&mut self, id: EntityId, labels: Vec<String>) -> ModelResult<usize> {
        self.append_dimension(id, SetDimension::new(labels).into())
    }

    pub fn set_dimension(
        &mut self,
        id: EntityId,
        index: usize,
        dimension: Dimension,
    ) -> ModelResult<()> {
        self.update_data_array(id, "dimensions", |array| {
            array.set_dimension(index, dimension)
        })
    }

    /// Edits one dimension in place; rejected edits leave it unchanged.
    pub fn update_dimension<R>(
        &mut self,
        id: EntityId,
        index: usize,
        edit: impl FnOnce(&mut Dimension) -> ModelResult<R>,
    ) -> ModelResult<R> {
        self.update_data_array(id, "dimensions", |array| {
            array.update_dimension(index, edit)
        })
    }

    pub fn delete_dimensions(&mut self, id: EntityId) -> ModelResult<()> {
        self.update_data_array(id, "dimensions", |array| {
            array.delete_dimensions();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::MemoryJournal;
    use crate::error::ModelError;
    use crate::file::File;
    use crate::model::data_array::{ArrayBuffer, DataType, Region};
    use crate::model::dimension::Dimension;
    use crate::model::tag::LinkType;

    #[test]
    fn referenced_arrays_cannot_be_deleted() {
        let mut file = File::new();
        let block = file.create_block("session", None).unwrap();
        let signal = file
            .create_data_array(block, "signal", None, DataType::Double, vec![8])
            .unwrap();
        let extra = file
            .create_data_array(block, "extra", None, DataType::Double, vec![8])
            .unwrap();
        let tag = file
            .create_simple_tag(block, "stim", None, vec![2.0])
            .unwrap();
        file.attach_reference(tag, signal).unwrap();
        let feature = file.create_feature(tag, extra, LinkType::Untagged).unwrap();

        assert!(matches!(
            file.delete_data_array(signal),
            Err(ModelError::ReferencedEntity { referrer, .. }) if referrer == tag
        ));
        assert!(matches!(
            file.delete_data_array(extra),
            Err(ModelError::ReferencedEntity { referrer, .. }) if referrer == feature
        ));

        file.detach_reference(tag, signal).unwrap();
        file.delete_data_array(signal).unwrap();
        assert!(!file.contains(signal));
        assert!(file.data_array(extra).is_ok());
    }

    #[test]
    fn reshape_is_checked_against_tags() {
        let mut file = File::new();
        let block = file.create_block("session", None).unwrap();
        let signal = file
            .create_data_array(block, "signal", None, DataType::Int, vec![2, 3])
            .unwrap();
        file.write_all(signal, vec![1_i64, 2, 3, 4, 5, 6].into())
            .unwrap();
        let tag = file
            .create_simple_tag(block, "roi", None, vec![0.0, 0.0])
            .unwrap();
        file.attach_reference(tag, signal).unwrap();

        assert!(matches!(
            file.set_data_array_shape(signal, vec![6]),
            Err(ModelError::ShapeMismatch { .. })
        ));
        assert_eq!(file.data_array(signal).unwrap().shape(), &[2, 3]);

        file.set_data_array_shape(signal, vec![3, 3]).unwrap();
        let region = Region::new(vec![0, 0], vec![3, 3]);
        assert_eq!(
            file.read_region(signal, &region).unwrap(),
            ArrayBuffer::Int(vec![1, 2, 3, 4, 5, 6, 0, 0, 0])
        );
    }

    #[test]
    fn dimension_edits_are_committed() {
        let journal = MemoryJournal::new();
        let mut file = File::new();
        file.set_commit_hook(Box::new(journal.clone()));
        let block = file.create_block("session", None).unwrap();
        let array = file
            .create_data_array(block, "trace", None, DataType::Double, vec![3])
            .unwrap();

        assert!(file.append_range_dimension(array, vec![1.0, 1.0, 2.0]).is_err());
        assert_eq!(file.append_range_dimension(array, vec![1.0, 2.0, 3.0]).unwrap(), 0);
        assert!(matches!(
            file.append_set_dimension(array, Vec::new()),
            Err(ModelError::InvalidIndex { index: 1, rank: 1 })
        ));
        file.update_dimension(array, 0, |dimension| match dimension {
            Dimension::Range(range) => {
                range.set_unit(Some("m s"));
                Ok(())
            }
            _ => Err(ModelError::InvalidDimension("expected range".to_string())),
        })
        .unwrap();
        assert_eq!(
            file.data_array(array).unwrap().dimension(0).and_then(|d| d.unit()),
            Some("ms")
        );

        let fields: Vec<_> = journal.events().iter().map(|event| event.field).collect();
        assert_eq!(fields, vec![None, None, Some("dimensions"), Some("dimensions")]);
    }
}
