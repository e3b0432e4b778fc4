//! Named, typed value lists held by sections.
//!
//! # Responsibility
//! - Hold an ordered, homogeneous list of `Value`s under one name.
//! - Carry the odML annotation fields (unit, uncertainty, origin, ...).
//!
//! # Invariants
//! - `value_type` is `Some` iff `values` is non-empty, and every value has it.
//! - `odml_type`, when set, is compatible with `value_type`.
//! - Empty units are stored as absent.

use crate::error::{ModelError, ModelResult};
use crate::model::entity::{create_id, now_ms, validate_name, EntityId};
use crate::model::value::{common_value_type, Value, ValueType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

static UNIT_WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid unit whitespace regex"));

/// Semantic type hints of the odML metadata format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OdmlType {
    Boolean,
    Int,
    Float,
    String,
    Text,
    Url,
    Person,
    Datetime,
    Date,
    Time,
}

impl OdmlType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Text => "text",
            Self::Url => "url",
            Self::Person => "person",
            Self::Datetime => "datetime",
            Self::Date => "date",
            Self::Time => "time",
        }
    }

    /// Whether values of `value_type` may carry this hint.
    pub fn compatible(self, value_type: ValueType) -> bool {
        match self {
            Self::Boolean => value_type == ValueType::Bool,
            Self::Int => value_type == ValueType::Int,
            Self::Float => value_type == ValueType::Double,
            Self::String
            | Self::Text
            | Self::Url
            | Self::Person
            | Self::Datetime
            | Self::Date
            | Self::Time => value_type == ValueType::String,
        }
    }

    /// Default hint for a payload type.
    pub fn for_value_type(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Double => Self::Float,
            ValueType::Int => Self::Int,
            ValueType::String => Self::String,
            ValueType::Bool => Self::Boolean,
        }
    }
}

/// Normalizes a unit string; blank units become `None`.
pub fn sanitize_unit(unit: &str) -> Option<String> {
    let compact = UNIT_WHITESPACE_RE.replace_all(unit, "");
    let normalized = compact.replace(['µ', 'μ'], "u");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Metadata key slot with its ordered values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    id: EntityId,
    name: String,
    definition: Option<String>,
    values: Vec<Value>,
    value_type: Option<ValueType>,
    unit: Option<String>,
    uncertainty: Option<f64>,
    reference: Option<String>,
    dependency: Option<String>,
    dependency_value: Option<String>,
    value_origin: Option<String>,
    odml_type: Option<OdmlType>,
    created_at: i64,
    updated_at: i64,
}

impl Property {
    /// Creates a property; fails with `TypeMismatch` on a mixed value list.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> ModelResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        let value_type = common_value_type(&values)?;
        let stamp = now_ms();
        Ok(Self {
            id: create_id(),
            name,
            definition: None,
            values,
            value_type,
            unit: None,
            uncertainty: None,
            reference: None,
            dependency: None,
            dependency_value: None,
            value_origin: None,
            odml_type: None,
            created_at: stamp,
            updated_at: stamp,
        })
    }

    /// Same values and annotations under a fresh id.
    pub(crate) fn duplicate(&self) -> Self {
        let stamp = now_ms();
        Self {
            id: create_id(),
            created_at: stamp,
            updated_at: stamp,
            ..self.clone()
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> Option<&str> {
        self.definition.as_deref()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn uncertainty(&self) -> Option<f64> {
        self.uncertainty
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn dependency(&self) -> Option<&str> {
        self.dependency.as_deref()
    }

    pub fn dependency_value(&self) -> Option<&str> {
        self.dependency_value.as_deref()
    }

    pub fn value_origin(&self) -> Option<&str> {
        self.value_origin.as_deref()
    }

    pub fn odml_type(&self) -> Option<OdmlType> {
        self.odml_type
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Replaces all values; the new list may change the value type.
    pub fn set_values(&mut self, values: Vec<Value>) -> ModelResult<()> {
        let value_type = common_value_type(&values)?;
        if let (Some(odml_type), Some(value_type)) = (self.odml_type, value_type) {
            if !odml_type.compatible(value_type) {
                return Err(ModelError::TypeMismatch {
                    expected: odml_type.as_str(),
                    actual: value_type.as_str(),
                });
            }
        }
        self.values = values;
        self.value_type = value_type;
        self.touch();
        Ok(())
    }

    /// Appends values that share the existing value type.
    pub fn extend_values(&mut self, values: Vec<Value>) -> ModelResult<()> {
        let Some(incoming) = common_value_type(&values)? else {
            return Ok(());
        };
        if let Some(current) = self.value_type {
            if current != incoming {
                return Err(ModelError::TypeMismatch {
                    expected: current.as_str(),
                    actual: incoming.as_str(),
                });
            }
        } else if let Some(odml_type) = self.odml_type {
            if !odml_type.compatible(incoming) {
                return Err(ModelError::TypeMismatch {
                    expected: odml_type.as_str(),
                    actual: incoming.as_str(),
                });
            }
        }
        self.values.extend(values);
        self.value_type = Some(incoming);
        self.touch();
        Ok(())
    }

    /// Drops every value; the value type becomes unknown.
    pub fn clear_values(&mut self) {
        self.values.clear();
        self.value_type = None;
        self.touch();
    }

    pub fn set_definition(&mut self, definition: Option<&str>) {
        self.definition = definition.map(str::to_string);
        self.touch();
    }

    pub fn set_unit(&mut self, unit: Option<&str>) {
        self.unit = unit.and_then(sanitize_unit);
        self.touch();
    }

    pub fn set_uncertainty(&mut self, uncertainty: Option<f64>) {
        self.uncertainty = uncertainty;
        self.touch();
    }

    pub fn set_reference(&mut self, reference: Option<&str>) {
        self.reference = reference.map(str::to_string);
        self.touch();
    }

    pub fn set_dependency(&mut self, dependency: Option<&str>) {
        self.dependency = dependency.map(str::to_string);
        self.touch();
    }

    pub fn set_dependency_value(&mut self, dependency_value: Option<&str>) {
        self.dependency_value = dependency_value.map(str::to_string);
        self.touch();
    }

    pub fn set_value_origin(&mut self, value_origin: Option<&str>) {
        self.value_origin = value_origin.map(str::to_string);
        self.touch();
    }

    /// Sets the odML hint; requires values whose type it is compatible with.
    pub fn set_odml_type(&mut self, odml_type: Option<OdmlType>) -> ModelResult<()> {
        if let Some(hint) = odml_type {
            match self.value_type {
                Some(value_type) if hint.compatible(value_type) => {}
                Some(value_type) => {
                    return Err(ModelError::TypeMismatch {
                        expected: hint.as_str(),
                        actual: value_type.as_str(),
                    });
                }
                None => {
                    return Err(ModelError::TypeMismatch {
                        expected: hint.as_str(),
                        actual: "empty",
                    });
                }
            }
        }
        self.odml_type = odml_type;
        self.touch();
        Ok(())
    }

    /// Re-checks invariants of a deserialized property.
    pub(crate) fn check_consistency(&self) -> ModelResult<()> {
        validate_name(&self.name)?;
        let actual = common_value_type(&self.values)?;
        if actual != self.value_type {
            return Err(ModelError::InvalidData(format!(
                "property `{}` declares value type {:?} but holds {:?}",
                self.name, self.value_type, actual
            )));
        }
        if let (Some(hint), Some(value_type)) = (self.odml_type, actual) {
            if !hint.compatible(value_type) {
                return Err(ModelError::TypeMismatch {
                    expected: hint.as_str(),
                    actual: value_type.as_str(),
                });
            }
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = now_ms().max(self.updated_at + 1);
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Property {}

impl Display for Property {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Property: {{id = {}, name = {}}}", self.id, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_unit, OdmlType, Property};
    use crate::error::ModelError;
    use crate::model::value::{Value, ValueType};

    #[test]
    fn extend_values_keeps_type_fixed() {
        let mut prop = Property::new("gain", vec![Value::from(1.0)]).unwrap();
        prop.extend_values(vec![Value::from(2.0), Value::from(3.0)])
            .unwrap();
        assert_eq!(prop.values().len(), 3);

        let err = prop.extend_values(vec![Value::from(true)]).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
        assert_eq!(prop.values().len(), 3);
    }

    #[test]
    fn odml_type_must_match_values() {
        let mut prop = Property::new("subject", vec![Value::from("mouse")]).unwrap();
        prop.set_odml_type(Some(OdmlType::Person)).unwrap();
        assert!(prop.set_odml_type(Some(OdmlType::Int)).is_err());
        assert!(prop.set_values(vec![Value::from(3_i64)]).is_err());
        assert_eq!(prop.value_type(), Some(ValueType::String));
    }

    #[test]
    fn units_are_sanitized() {
        assert_eq!(sanitize_unit(" m V "), Some("mV".to_string()));
        assert_eq!(sanitize_unit("µs"), Some("us".to_string()));
        assert_eq!(sanitize_unit("  "), None);
    }

    #[test]
    fn equality_is_by_id() {
        let a = Property::new("p", vec![]).unwrap();
        let mut b = a.clone();
        b.set_unit(Some("s"));
        assert_eq!(a, b);
        assert_ne!(a, Property::new("p", vec![]).unwrap());
    }
}
