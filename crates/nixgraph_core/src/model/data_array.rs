//! N-dimensional typed arrays with per-axis dimension descriptors.
//!
//! # Responsibility
//! - Own the row-major element buffer of one fixed element type.
//! - Read and write rectangular regions.
//! - Keep dimension descriptors consistent with the shape.
//!
//! # Invariants
//! - `data.len()` equals the product of `shape`; every extent is positive.
//! - `data_type` never changes after creation.
//! - `dimensions.len() <= shape.len()` and descriptor `i` fits `shape[i]`.
//! - Failed writes, resizes and dimension edits leave the array untouched.

use crate::error::{ModelError, ModelResult};
use crate::model::dimension::Dimension;
use crate::model::entity::{impl_entity, Attachments, EntityId, EntityKind, EntityMeta};
use crate::model::property::sanitize_unit;
use serde::{Deserialize, Serialize};

/// Element type of a data array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Double,
    Int,
    Bool,
    String,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::String => "string",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Double | Self::Int)
    }
}

/// Flat element buffer in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", content = "values", rename_all = "snake_case")]
pub enum ArrayBuffer {
    Double(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
    String(Vec<String>),
}

impl ArrayBuffer {
    /// Buffer of `len` default elements.
    pub fn filled(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Double => Self::Double(vec![0.0; len]),
            DataType::Int => Self::Int(vec![0; len]),
            DataType::Bool => Self::Bool(vec![false; len]),
            DataType::String => Self::String(vec![String::new(); len]),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Double(_) => DataType::Double,
            Self::Int(_) => DataType::Int,
            Self::Bool(_) => DataType::Bool,
            Self::String(_) => DataType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Double(values) => values.len(),
            Self::Int(values) => values.len(),
            Self::Bool(values) => values.len(),
            Self::String(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_doubles(&self) -> Option<&[f64]> {
        match self {
            Self::Double(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Int(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_bools(&self) -> Option<&[bool]> {
        match self {
            Self::Bool(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Self::String(values) => Some(values),
            _ => None,
        }
    }

    /// Numeric contents widened to `f64`; `None` for bool and string buffers.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Self::Double(values) => Some(values.clone()),
            Self::Int(values) => Some(values.iter().map(|value| *value as f64).collect()),
            Self::Bool(_) | Self::String(_) => None,
        }
    }

    fn gather(&self, indices: &[usize]) -> Self {
        match self {
            Self::Double(values) => Self::Double(indices.iter().map(|i| values[*i]).collect()),
            Self::Int(values) => Self::Int(indices.iter().map(|i| values[*i]).collect()),
            Self::Bool(values) => Self::Bool(indices.iter().map(|i| values[*i]).collect()),
            Self::String(values) => {
                Self::String(indices.iter().map(|i| values[*i].clone()).collect())
            }
        }
    }

    /// Writes `source[k]` to `self[indices[k]]`. Callers check type and length.
    fn scatter(&mut self, indices: &[usize], source: Self) {
        match (self, source) {
            (Self::Double(target), Self::Double(values)) => {
                for (index, value) in indices.iter().zip(values) {
                    target[*index] = value;
                }
            }
            (Self::Int(target), Self::Int(values)) => {
                for (index, value) in indices.iter().zip(values) {
                    target[*index] = value;
                }
            }
            (Self::Bool(target), Self::Bool(values)) => {
                for (index, value) in indices.iter().zip(values) {
                    target[*index] = value;
                }
            }
            (Self::String(target), Self::String(values)) => {
                for (index, value) in indices.iter().zip(values) {
                    target[*index] = value;
                }
            }
            _ => {}
        }
    }
}

impl From<Vec<f64>> for ArrayBuffer {
    fn from(value: Vec<f64>) -> Self {
        Self::Double(value)
    }
}

impl From<Vec<i64>> for ArrayBuffer {
    fn from(value: Vec<i64>) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<bool>> for ArrayBuffer {
    fn from(value: Vec<bool>) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for ArrayBuffer {
    fn from(value: Vec<String>) -> Self {
        Self::String(value)
    }
}

/// Rectangular selection: `offset` and `extent` per axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub offset: Vec<usize>,
    pub extent: Vec<usize>,
}

impl Region {
    pub fn new(offset: Vec<usize>, extent: Vec<usize>) -> Self {
        Self { offset, extent }
    }

    /// Region covering a whole array of `shape`.
    pub fn full(shape: &[usize]) -> Self {
        Self {
            offset: vec![0; shape.len()],
            extent: shape.to_vec(),
        }
    }

    pub fn count(&self) -> usize {
        self.extent.iter().product()
    }

    /// Checks rank and bounds against `shape`.
    pub fn check_within(&self, shape: &[usize]) -> ModelResult<()> {
        for len in [self.offset.len(), self.extent.len()] {
            if len != shape.len() {
                return Err(ModelError::ShapeMismatch {
                    expected: shape.len(),
                    actual: len,
                });
            }
        }
        for (axis, ((offset, extent), bound)) in self
            .offset
            .iter()
            .zip(&self.extent)
            .zip(shape)
            .enumerate()
        {
            if offset.saturating_add(*extent) > *bound {
                return Err(ModelError::OutOfBounds(format!(
                    "axis {axis}: {offset}+{extent} exceeds extent {bound}"
                )));
            }
        }
        Ok(())
    }
}

/// Flat row-major indices covered by `region` inside `shape`.
pub(crate) fn region_indices(shape: &[usize], region: &Region) -> Vec<usize> {
    let count = region.count();
    let mut indices = Vec::with_capacity(count);
    if count == 0 {
        return indices;
    }
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    let mut cursor = vec![0usize; shape.len()];
    loop {
        let flat = cursor
            .iter()
            .zip(&region.offset)
            .zip(&strides)
            .map(|((step, offset), stride)| (step + offset) * stride)
            .sum();
        indices.push(flat);

        let mut axis = cursor.len();
        loop {
            if axis == 0 {
                return indices;
            }
            axis -= 1;
            cursor[axis] += 1;
            if cursor[axis] < region.extent[axis] {
                break;
            }
            cursor[axis] = 0;
        }
    }
}

/// Validates `shape` and returns its element count.
fn check_shape(shape: &[usize]) -> ModelResult<usize> {
    if shape.is_empty() {
        return Err(ModelError::ShapeMismatch {
            expected: 1,
            actual: 0,
        });
    }
    if shape.iter().any(|extent| *extent == 0) {
        return Err(ModelError::ShapeMismatch {
            expected: 1,
            actual: 0,
        });
    }
    element_count(shape)
}

/// Product of the extents; fails with `InvalidData` instead of wrapping.
pub(crate) fn element_count(shape: &[usize]) -> ModelResult<usize> {
    shape.iter().try_fold(1usize, |count, extent| {
        count.checked_mul(*extent).ok_or_else(|| {
            ModelError::InvalidData(format!("shape {shape:?} has too many elements"))
        })
    })
}

/// Evaluates `sum(c[i] * x^i)`.
fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, coefficient| acc * x + coefficient)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataArray {
    pub(crate) meta: EntityMeta,
    pub(crate) data_type: DataType,
    pub(crate) shape: Vec<usize>,
    pub(crate) data: ArrayBuffer,
    pub(crate) written: bool,
    pub(crate) dimensions: Vec<Dimension>,
    pub(crate) label: Option<String>,
    pub(crate) unit: Option<String>,
    pub(crate) expansion_origin: Option<f64>,
    pub(crate) polynom_coefficients: Vec<f64>,
    pub(crate) metadata: Option<EntityId>,
    pub(crate) sources: Vec<EntityId>,
}

impl_entity!(DataArray, EntityKind::DataArray);

impl DataArray {
    /// Creates an array filled with the element type's default value.
    pub fn new(
        name: impl Into<String>,
        array_type: Option<&str>,
        data_type: DataType,
        shape: Vec<usize>,
    ) -> ModelResult<Self> {
        let len = check_shape(&shape)?;
        Ok(Self {
            meta: EntityMeta::new(name, array_type)?,
            data_type,
            shape,
            data: ArrayBuffer::filled(data_type, len),
            written: false,
            dimensions: Vec::new(),
            label: None,
            unit: None,
            expansion_origin: None,
            polynom_coefficients: Vec::new(),
            metadata: None,
            sources: Vec::new(),
        })
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn element_count(&self) -> usize {
        self.data.len()
    }

    /// True once any element has been written.
    pub fn has_data(&self) -> bool {
        self.written
    }

    pub fn data(&self) -> &ArrayBuffer {
        &self.data
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension(&self, index: usize) -> Option<&Dimension> {
        self.dimensions.get(index)
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn expansion_origin(&self) -> Option<f64> {
        self.expansion_origin
    }

    pub fn polynom_coefficients(&self) -> &[f64] {
        &self.polynom_coefficients
    }

    pub fn metadata(&self) -> Option<EntityId> {
        self.metadata
    }

    pub fn sources(&self) -> &[EntityId] {
        &self.sources
    }

    pub fn read_region(&self, region: &Region) -> ModelResult<ArrayBuffer> {
        region.check_within(&self.shape)?;
        Ok(self.data.gather(&region_indices(&self.shape, region)))
    }

    /// Reads numeric elements with the polynomial calibration applied.
    pub fn read_calibrated(&self, region: &Region) -> ModelResult<Vec<f64>> {
        let raw = self
            .read_region(region)?
            .to_f64_vec()
            .ok_or(ModelError::TypeMismatch {
                expected: "numeric",
                actual: self.data_type.as_str(),
            })?;
        if self.polynom_coefficients.is_empty() && self.expansion_origin.is_none() {
            return Ok(raw);
        }
        let origin = self.expansion_origin.unwrap_or(0.0);
        if self.polynom_coefficients.is_empty() {
            return Ok(raw.into_iter().map(|value| value - origin).collect());
        }
        Ok(raw
            .into_iter()
            .map(|value| polyval(&self.polynom_coefficients, value - origin))
            .collect())
    }

    /// Writes `values` into `region`; the array is untouched on failure.
    pub fn write_region(&mut self, region: &Region, values: ArrayBuffer) -> ModelResult<()> {
        if values.data_type() != self.data_type {
            return Err(ModelError::TypeMismatch {
                expected: self.data_type.as_str(),
                actual: values.data_type().as_str(),
            });
        }
        region.check_within(&self.shape)?;
        let count = region.count();
        if values.len() != count {
            return Err(ModelError::ShapeMismatch {
                expected: count,
                actual: values.len(),
            });
        }
        let indices = region_indices(&self.shape, region);
        self.data.scatter(&indices, values);
        self.written = true;
        self.meta.touch();
        Ok(())
    }

    /// Replaces the whole buffer.
    pub fn write_all(&mut self, values: ArrayBuffer) -> ModelResult<()> {
        let region = Region::full(&self.shape);
        self.write_region(&region, values)
    }

    /// Changes the shape, keeping the overlapping row-major content.
    ///
    /// Every dimension is re-validated against the new extents first; the
    /// resize is rejected as a whole if any of them no longer fits.
    pub fn set_shape(&mut self, shape: Vec<usize>) -> ModelResult<()> {
        let len = check_shape(&shape)?;
        if self.dimensions.len() > shape.len() {
            return Err(ModelError::InvalidDimension(format!(
                "{} dimensions cannot describe rank {}",
                self.dimensions.len(),
                shape.len()
            )));
        }
        for (dimension, extent) in self.dimensions.iter().zip(&shape) {
            dimension.validate(*extent)?;
        }

        let mut data = ArrayBuffer::filled(self.data_type, len);
        if shape.len() == self.shape.len() {
            let overlap: Vec<usize> = self
                .shape
                .iter()
                .zip(&shape)
                .map(|(old, new)| (*old).min(*new))
                .collect();
            let region = Region::new(vec![0; shape.len()], overlap);
            let kept = self.data.gather(&region_indices(&self.shape, &region));
            data.scatter(&region_indices(&shape, &region), kept);
        }
        self.shape = shape;
        self.data = data;
        self.meta.touch();
        Ok(())
    }

    /// Appends the descriptor of the next undescribed axis; returns its index.
    pub fn append_dimension(&mut self, dimension: Dimension) -> ModelResult<usize> {
        let index = self.dimensions.len();
        if index >= self.rank() {
            return Err(ModelError::InvalidIndex {
                index,
                rank: self.rank(),
            });
        }
        dimension.validate(self.shape[index])?;
        self.dimensions.push(dimension);
        self.meta.touch();
        Ok(index)
    }

    /// Replaces the descriptor at an existing index.
    pub fn set_dimension(&mut self, index: usize, dimension: Dimension) -> ModelResult<()> {
        self.update_dimension(index, |slot| {
            *slot = dimension;
            Ok(())
        })
    }

    /// Edits one descriptor on a copy and commits it only if it still fits.
    pub fn update_dimension<R>(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut Dimension) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let current = self.dimensions.get(index).ok_or(ModelError::InvalidIndex {
            index,
            rank: self.dimensions.len(),
        })?;
        let mut staged = current.clone();
        let result = edit(&mut staged)?;
        staged.validate(self.shape[index])?;
        self.dimensions[index] = staged;
        self.meta.touch();
        Ok(result)
    }

    pub fn delete_dimensions(&mut self) {
        self.dimensions.clear();
        self.meta.touch();
    }

    pub fn set_label(&mut self, label: Option<&str>) {
        self.label = label.map(str::to_string);
        self.meta.touch();
    }

    pub fn set_unit(&mut self, unit: Option<&str>) {
        self.unit = unit.and_then(sanitize_unit);
        self.meta.touch();
    }

    pub fn set_expansion_origin(&mut self, origin: Option<f64>) {
        self.expansion_origin = origin;
        self.meta.touch();
    }

    pub fn set_polynom_coefficients(&mut self, coefficients: Vec<f64>) {
        self.polynom_coefficients = coefficients;
        self.meta.touch();
    }

    /// Re-checks invariants of a deserialized array.
    pub(crate) fn check_consistency(&self) -> ModelResult<()> {
        let expected = check_shape(&self.shape)?;
        if self.data.len() != expected {
            return Err(ModelError::ShapeMismatch {
                expected,
                actual: self.data.len(),
            });
        }
        if self.data.data_type() != self.data_type {
            return Err(ModelError::TypeMismatch {
                expected: self.data_type.as_str(),
                actual: self.data.data_type().as_str(),
            });
        }
        if self.dimensions.len() > self.rank() {
            return Err(ModelError::InvalidIndex {
                index: self.dimensions.len() - 1,
                rank: self.rank(),
            });
        }
        for (dimension, extent) in self.dimensions.iter().zip(&self.shape) {
            dimension.validate(*extent)?;
        }
        Ok(())
    }
}

impl Attachments for DataArray {
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
    use super::{region_indices, ArrayBuffer, DataArray, DataType, Region};
    use crate::error::ModelError;
    use crate::model::dimension::{Dimension, RangeDimension, SampledDimension};

    fn array(shape: Vec<usize>) -> DataArray {
        DataArray::new("signal", Some("nix.sampled"), DataType::Double, shape).unwrap()
    }

    #[test]
    fn region_indices_are_row_major() {
        let region = Region::new(vec![1, 1], vec![2, 2]);
        assert_eq!(region_indices(&[3, 4], &region), vec![5, 6, 9, 10]);
    }

    #[test]
    fn write_then_read_region() {
        let mut arr = array(vec![3, 4]);
        assert!(!arr.has_data());
        let region = Region::new(vec![1, 2], vec![2, 2]);
        arr.write_region(&region, vec![1.0, 2.0, 3.0, 4.0].into())
            .unwrap();
        assert!(arr.has_data());
        assert_eq!(
            arr.read_region(&region).unwrap(),
            ArrayBuffer::Double(vec![1.0, 2.0, 3.0, 4.0])
        );
    }

    #[test]
    fn rejected_writes_leave_data_unchanged() {
        let mut arr = array(vec![2, 2]);
        let before = arr.data().clone();
        let outside = Region::new(vec![1, 1], vec![2, 1]);
        assert!(matches!(
            arr.write_region(&outside, vec![1.0, 2.0].into()),
            Err(ModelError::OutOfBounds(_))
        ));
        assert!(matches!(
            arr.write_region(&Region::full(&[2, 2]), vec![1_i64, 2, 3, 4].into()),
            Err(ModelError::TypeMismatch { .. })
        ));
        assert_eq!(arr.data(), &before);
        assert!(!arr.has_data());
    }

    #[test]
    fn oversized_shapes_are_rejected() {
        let huge = vec![usize::MAX, 2];
        assert!(matches!(
            DataArray::new("huge", None, DataType::Double, huge.clone()),
            Err(ModelError::InvalidData(_))
        ));
        let mut arr = array(vec![2, 2]);
        assert!(matches!(
            arr.set_shape(huge),
            Err(ModelError::InvalidData(_))
        ));
        assert_eq!(arr.shape(), &[2, 2]);
    }

    #[test]
    fn dimensions_past_rank_are_rejected() {
        let mut arr = array(vec![3]);
        arr.append_dimension(SampledDimension::new(1.0).unwrap().into())
            .unwrap();
        let err = arr
            .append_dimension(SampledDimension::new(1.0).unwrap().into())
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidIndex { index: 1, rank: 1 }));
    }

    #[test]
    fn resize_keeps_overlap_and_rolls_back_on_bad_dimension() {
        let mut arr = array(vec![2, 2]);
        arr.write_all(vec![1.0, 2.0, 3.0, 4.0].into()).unwrap();
        arr.set_shape(vec![3, 1]).unwrap();
        assert_eq!(arr.data(), &ArrayBuffer::Double(vec![1.0, 3.0, 0.0]));

        let ticks = Dimension::from(RangeDimension::new(vec![0.0, 1.0, 2.0]).unwrap());
        arr.append_dimension(ticks).unwrap();
        let err = arr.set_shape(vec![4, 1]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidDimension(_)));
        assert_eq!(arr.shape(), &[3, 1]);
    }

    #[test]
    fn calibration_applies_polynomial() {
        let mut arr = array(vec![3]);
        arr.write_all(vec![1.0, 2.0, 3.0].into()).unwrap();
        arr.set_expansion_origin(Some(1.0));
        arr.set_polynom_coefficients(vec![0.5, 2.0]);
        let values = arr.read_calibrated(&Region::full(&[3])).unwrap();
        assert_eq!(values, vec![0.5, 2.5, 4.5]);
    }
}
