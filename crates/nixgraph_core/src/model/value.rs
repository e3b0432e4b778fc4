//! Typed metadata values.
//!
//! # Invariants
//! - Exactly one payload type is active per `Value`.
//! - A value list is homogeneous when every payload shares one `ValueType`.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Payload type tag of a `Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Double,
    Int,
    String,
    Bool,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Int => "int",
            Self::String => "string",
            Self::Bool => "bool",
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active payload of a `Value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ValueData {
    Double(f64),
    Int(i64),
    String(String),
    Bool(bool),
}

impl ValueData {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Double(_) => ValueType::Double,
            Self::Int(_) => ValueType::Int,
            Self::String(_) => ValueType::String,
            Self::Bool(_) => ValueType::Bool,
        }
    }
}

/// One metadata cell: a payload plus optional annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub data: ValueData,
    pub uncertainty: Option<f64>,
    pub reference: Option<String>,
    pub filename: Option<String>,
    pub checksum: Option<String>,
    pub encoder: Option<String>,
}

impl Value {
    pub fn new(data: ValueData) -> Self {
        Self {
            data,
            uncertainty: None,
            reference: None,
            filename: None,
            checksum: None,
            encoder: None,
        }
    }

    pub fn with_uncertainty(mut self, uncertainty: f64) -> Self {
        self.uncertainty = Some(uncertainty);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn value_type(&self) -> ValueType {
        self.data.value_type()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.data {
            ValueData::Double(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.data {
            ValueData::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ValueData::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data {
            ValueData::Bool(value) => Some(value),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::new(ValueData::Double(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::new(ValueData::Int(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::new(ValueData::Bool(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::new(ValueData::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::new(ValueData::String(value))
    }
}

/// Returns the single payload type shared by `values`.
///
/// `Ok(None)` for an empty list; `TypeMismatch` naming the first offender
/// otherwise.
pub fn common_value_type(values: &[Value]) -> ModelResult<Option<ValueType>> {
    let Some(first) = values.first() else {
        return Ok(None);
    };
    let expected = first.value_type();
    for value in &values[1..] {
        let actual = value.value_type();
        if actual != expected {
            return Err(ModelError::TypeMismatch {
                expected: expected.as_str(),
                actual: actual.as_str(),
            });
        }
    }
    Ok(Some(expected))
}

#[cfg(test)]
mod tests {
    use super::{common_value_type, Value, ValueType};
    use crate::error::ModelError;

    #[test]
    fn homogeneous_lists_report_their_type() {
        let values = vec![Value::from(1.5), Value::from(2.0)];
        assert_eq!(common_value_type(&values).unwrap(), Some(ValueType::Double));
        assert_eq!(common_value_type(&[]).unwrap(), None);
    }

    #[test]
    fn mixed_lists_are_rejected() {
        let values = vec![Value::from(1_i64), Value::from("one")];
        let err = common_value_type(&values).unwrap_err();
        assert!(matches!(
            err,
            ModelError::TypeMismatch {
                expected: "int",
                actual: "string"
            }
        ));
    }
}
