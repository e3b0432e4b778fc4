//! Non-fatal consistency report over a whole file.
//!
//! # Responsibility
//! - Collect soft issues that mutations do not reject.
//! - Never mutate the file.

use crate::file::File;
use crate::model::data_array::DataArray;
use crate::model::dimension::Dimension;
use crate::model::entity::{Entity, EntityId, EntityKind, EntityMeta};
use crate::model::tag::Tag;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};

static SI_ATOM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(Y|Z|E|P|T|G|M|k|h|da|d|c|m|u|n|p|f|a|z|y)?(m|g|s|A|K|mol|cd|Hz|N|Pa|J|W|C|V|F|S|Wb|T|H|lm|lx|Bq|Gy|Sv|kat|rad|sr|l|L|Ohm|deg|min|h|d)(\^-?[0-9]+)?$",
    )
    .expect("valid SI unit regex")
});

static UNIT_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[*/]").expect("valid unit separator regex"));

/// Whether `unit` is a product/quotient of prefixed SI atoms, e.g. `mV`,
/// `m/s^2`, `uA*ms`.
pub fn looks_like_si_unit(unit: &str) -> bool {
    !unit.is_empty() && UNIT_SEPARATOR_RE.split(unit).all(|atom| SI_ATOM_RE.is_match(atom))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub message: String,
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.entity_id, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn for_entity(&self, id: EntityId) -> impl Iterator<Item = &ValidationIssue> + '_ {
        self.issues.iter().filter(move |issue| issue.entity_id == id)
    }

    fn push(&mut self, id: EntityId, kind: EntityKind, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            entity_id: id,
            kind,
            message: message.into(),
        });
    }

    fn check_type(&mut self, meta: &EntityMeta, kind: EntityKind) {
        if meta.entity_type.as_deref().map_or(true, str::is_empty) {
            self.push(meta.id, kind, "type is not set");
        }
    }

    fn check_metadata(&mut self, file: &File, id: EntityId, kind: EntityKind, metadata: Option<EntityId>) {
        if let Some(section) = metadata {
            if file.section(section).is_err() {
                self.push(id, kind, format!("metadata section {section} no longer exists"));
            }
        }
    }

    fn check_array(&mut self, array: &DataArray) {
        let id = array.id();
        if array.dimensions().len() != array.rank() {
            self.push(
                id,
                EntityKind::DataArray,
                format!(
                    "{} dimensions describe rank {}",
                    array.dimensions().len(),
                    array.rank()
                ),
            );
        }
        if let Some(unit) = array.unit() {
            if !looks_like_si_unit(unit) {
                self.push(id, EntityKind::DataArray, format!("unit `{unit}` is not an SI unit"));
            }
        }
        match (array.expansion_origin(), array.polynom_coefficients().is_empty()) {
            (Some(_), true) => self.push(
                id,
                EntityKind::DataArray,
                "expansion origin is set without polynomial coefficients",
            ),
            (None, false) => self.push(
                id,
                EntityKind::DataArray,
                "polynomial coefficients are set without an expansion origin",
            ),
            _ => {}
        }
        for (axis, dimension) in array.dimensions().iter().enumerate() {
            let unit = match dimension {
                Dimension::Sampled(sampled) => sampled.unit(),
                Dimension::Range(range) => range.unit(),
                Dimension::Set(_) => None,
            };
            if let Some(unit) = unit {
                if !looks_like_si_unit(unit) {
                    self.push(
                        id,
                        EntityKind::DataArray,
                        format!("dimension {axis} unit `{unit}` is not an SI unit"),
                    );
                }
            }
        }
    }

    fn check_tag<T: Tag>(&mut self, file: &File, tag: &T) {
        self.check_type(tag.meta(), T::KIND);
        if tag.references().is_empty() {
            self.push(tag.id(), T::KIND, "tag references no data array");
        }
        self.check_metadata(file, tag.id(), T::KIND, tag.metadata());
    }
}

impl File {
    /// Reports soft issues; an empty report means none were found.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for section in self.sections().iter() {
            let id = section.id();
            report.check_type(section.meta(), EntityKind::Section);
            if let Some(link) = section.link() {
                if self.section(link).is_err() {
                    report.push(
                        id,
                        EntityKind::Section,
                        format!("link target {link} no longer exists"),
                    );
                }
            }
            for property in section.properties() {
                if !property.values().is_empty() && property.unit().is_none() {
                    report.push(
                        id,
                        EntityKind::Section,
                        format!("property `{}` has values but no unit", property.name()),
                    );
                }
            }
        }

        for block in self.blocks().iter() {
            report.check_type(block.meta(), EntityKind::Block);
            report.check_metadata(self, block.id(), EntityKind::Block, block.metadata());
            for source in block.sources().iter() {
                report.check_type(source.meta(), EntityKind::Source);
                report.check_metadata(self, source.id(), EntityKind::Source, source.metadata());
            }
            for array in block.data_arrays().iter() {
                report.check_type(array.meta(), EntityKind::DataArray);
                report.check_metadata(self, array.id(), EntityKind::DataArray, array.metadata());
                report.check_array(array);
            }
            for tag in block.simple_tags().iter() {
                report.check_tag(self, tag);
            }
            for tag in block.data_tags().iter() {
                report.check_tag(self, tag);
            }
        }
        report
    }
}
