//! Per-axis dimension descriptors.
//!
//! # Responsibility
//! - Describe how indices along one array axis map to positions.
//! - Validate descriptor fields and their fit against an axis extent.
//!
//! # Invariants
//! - Sampled intervals are finite and strictly positive.
//! - Range ticks are finite and strictly increasing; ties are rejected.
//! - A descriptor attached to an axis matches that axis' current extent.

use crate::error::{ModelError, ModelResult};
use crate::model::property::sanitize_unit;
use serde::{Deserialize, Serialize};

/// Regularly sampled axis: `position(i) = offset + i * sampling_interval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledDimension {
    sampling_interval: f64,
    offset: Option<f64>,
    unit: Option<String>,
    label: Option<String>,
}

impl SampledDimension {
    pub fn new(sampling_interval: f64) -> ModelResult<Self> {
        check_interval(sampling_interval)?;
        Ok(Self {
            sampling_interval,
            offset: None,
            unit: None,
            label: None,
        })
    }

    pub fn sampling_interval(&self) -> f64 {
        self.sampling_interval
    }

    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_sampling_interval(&mut self, sampling_interval: f64) -> ModelResult<()> {
        check_interval(sampling_interval)?;
        self.sampling_interval = sampling_interval;
        Ok(())
    }

    pub fn set_offset(&mut self, offset: Option<f64>) {
        self.offset = offset;
    }

    pub fn set_unit(&mut self, unit: Option<&str>) {
        self.unit = unit.and_then(sanitize_unit);
    }

    pub fn set_label(&mut self, label: Option<&str>) {
        self.label = label.map(str::to_string);
    }

    pub fn position_at(&self, index: usize) -> f64 {
        self.offset.unwrap_or(0.0) + index as f64 * self.sampling_interval
    }

    /// Nearest sample index for `position`; positions before the offset fail.
    pub fn index_of(&self, position: f64) -> ModelResult<usize> {
        let scaled = ((position - self.offset.unwrap_or(0.0)) / self.sampling_interval).round();
        if !scaled.is_finite() || scaled < 0.0 {
            return Err(ModelError::OutOfBounds(format!(
                "position {position} lies before the first sample"
            )));
        }
        Ok(scaled as usize)
    }

    /// Positions of `count` samples starting at index `start`.
    pub fn axis(&self, count: usize, start: usize) -> ModelResult<Vec<f64>> {
        let end = axis_end(start, count)?;
        Ok((start..end).map(|index| self.position_at(index)).collect())
    }
}

/// Irregular axis with explicit tick positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeDimension {
    ticks: Vec<f64>,
    unit: Option<String>,
    label: Option<String>,
}

impl RangeDimension {
    pub fn new(ticks: Vec<f64>) -> ModelResult<Self> {
        check_ticks(&ticks)?;
        Ok(Self {
            ticks,
            unit: None,
            label: None,
        })
    }

    pub fn ticks(&self) -> &[f64] {
        &self.ticks
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Replaces the ticks; the length check against the axis happens in
    /// the owning array.
    pub fn set_ticks(&mut self, ticks: Vec<f64>) -> ModelResult<()> {
        check_ticks(&ticks)?;
        self.ticks = ticks;
        Ok(())
    }

    pub fn set_unit(&mut self, unit: Option<&str>) {
        self.unit = unit.and_then(sanitize_unit);
    }

    pub fn set_label(&mut self, label: Option<&str>) {
        self.label = label.map(str::to_string);
    }

    pub fn tick_at(&self, index: usize) -> ModelResult<f64> {
        self.ticks.get(index).copied().ok_or_else(|| {
            ModelError::OutOfBounds(format!(
                "tick index {index} exceeds {} ticks",
                self.ticks.len()
            ))
        })
    }

    /// Index of the last tick at or before `position`. Positions outside the
    /// ticks clamp to the first or last index; NaN fails with `OutOfBounds`.
    pub fn index_of(&self, position: f64) -> ModelResult<usize> {
        if position.is_nan() {
            return Err(ModelError::OutOfBounds(
                "position NaN has no tick".to_string(),
            ));
        }
        let last = self.ticks.len().saturating_sub(1);
        if self.ticks.first().map_or(true, |first| position <= *first) {
            return Ok(0);
        }
        if self.ticks.last().map_or(true, |tail| position >= *tail) {
            return Ok(last);
        }
        // The first tick is below `position`, so the count is at least one.
        Ok(self.ticks.partition_point(|tick| *tick <= position) - 1)
    }

    pub fn axis(&self, count: usize, start: usize) -> ModelResult<Vec<f64>> {
        let end = axis_end(start, count)?;
        if end > self.ticks.len() {
            return Err(ModelError::OutOfBounds(format!(
                "axis {start}..{end} exceeds {} ticks",
                self.ticks.len()
            )));
        }
        Ok(self.ticks[start..end].to_vec())
    }
}

/// Categorical axis; an empty label list means unlabeled indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetDimension {
    labels: Vec<String>,
}

impl SetDimension {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn set_labels(&mut self, labels: Vec<String>) {
        self.labels = labels;
    }
}

/// Descriptor of one array axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dimension_type", rename_all = "snake_case")]
pub enum Dimension {
    Sampled(SampledDimension),
    Range(RangeDimension),
    Set(SetDimension),
}

impl Dimension {
    pub fn dimension_type(&self) -> &'static str {
        match self {
            Self::Sampled(_) => "sampled",
            Self::Range(_) => "range",
            Self::Set(_) => "set",
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::Sampled(dim) => dim.unit(),
            Self::Range(dim) => dim.unit(),
            Self::Set(_) => None,
        }
    }

    /// Checks the descriptor against the extent of the axis it describes.
    pub fn validate(&self, extent: usize) -> ModelResult<()> {
        match self {
            Self::Sampled(dim) => check_interval(dim.sampling_interval),
            Self::Range(dim) => {
                check_ticks(&dim.ticks)?;
                if dim.ticks.len() != extent {
                    return Err(ModelError::InvalidDimension(format!(
                        "range has {} ticks for an axis of extent {extent}",
                        dim.ticks.len()
                    )));
                }
                Ok(())
            }
            Self::Set(dim) => {
                if !dim.labels.is_empty() && dim.labels.len() != extent {
                    return Err(ModelError::InvalidDimension(format!(
                        "set has {} labels for an axis of extent {extent}",
                        dim.labels.len()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Resolves a position in dimension units to an axis index.
    pub fn index_of(&self, position: f64) -> ModelResult<usize> {
        match self {
            Self::Sampled(dim) => dim.index_of(position),
            Self::Range(dim) => dim.index_of(position),
            Self::Set(_) => plain_index(position),
        }
    }

    pub fn as_sampled(&self) -> Option<&SampledDimension> {
        match self {
            Self::Sampled(dim) => Some(dim),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeDimension> {
        match self {
            Self::Range(dim) => Some(dim),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SetDimension> {
        match self {
            Self::Set(dim) => Some(dim),
            _ => None,
        }
    }
}

impl From<SampledDimension> for Dimension {
    fn from(value: SampledDimension) -> Self {
        Self::Sampled(value)
    }
}

impl From<RangeDimension> for Dimension {
    fn from(value: RangeDimension) -> Self {
        Self::Range(value)
    }
}

impl From<SetDimension> for Dimension {
    fn from(value: SetDimension) -> Self {
        Self::Set(value)
    }
}

/// Rounded index for axes without a position mapping.
pub(crate) fn plain_index(position: f64) -> ModelResult<usize> {
    let rounded = position.round();
    if !rounded.is_finite() || rounded < 0.0 {
        return Err(ModelError::OutOfBounds(format!(
            "position {position} is not a valid index"
        )));
    }
    Ok(rounded as usize)
}

fn axis_end(start: usize, count: usize) -> ModelResult<usize> {
    start.checked_add(count).ok_or_else(|| {
        ModelError::InvalidData(format!("axis {start}+{count} overflows the index range"))
    })
}

fn check_interval(sampling_interval: f64) -> ModelResult<()> {
    if !sampling_interval.is_finite() || sampling_interval <= 0.0 {
        return Err(ModelError::InvalidDimension(format!(
            "sampling interval must be positive, got {sampling_interval}"
        )));
    }
    Ok(())
}

fn check_ticks(ticks: &[f64]) -> ModelResult<()> {
    if ticks.is_empty() {
        return Err(ModelError::InvalidDimension(
            "range needs at least one tick".to_string(),
        ));
    }
    if let Some(bad) = ticks.iter().find(|tick| !tick.is_finite()) {
        return Err(ModelError::InvalidDimension(format!(
            "tick {bad} is not finite"
        )));
    }
    if let Some(index) = ticks.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(ModelError::InvalidDimension(format!(
            "ticks must be strictly increasing; tick {} is {} after {}",
            index + 1,
            ticks[index + 1],
            ticks[index]
        )));
    }
    Ok(())
}
