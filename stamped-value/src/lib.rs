#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # stamped-value
//!
//! A typed primitive (string, signed integer, boolean, double) carried
//! alongside its last-modification timestamp and a monotonic revision
//! counter. Used by `config-backend` to hold global parameters and any
//! other attribute whose modification instant must survive a request.
//!
//! The rest of the configuration model is schema-evolving; a uniform
//! typed-with-stamp primitive avoids bespoke columns per parameter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four primitive kinds a [`StampedValue`] may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Integer,
    Boolean,
    Double,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::String => write!(f, "string"),
            ValueKind::Integer => write!(f, "integer"),
            ValueKind::Boolean => write!(f, "boolean"),
            ValueKind::Double => write!(f, "double"),
        }
    }
}

/// A typed primitive value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Boolean(bool),
    Double(f64),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Integer(_) => ValueKind::Integer,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Double(_) => ValueKind::Double,
        }
    }

    /// Canonical lexical form used for wire serialization (§6): booleans as
    /// `"true"`/`"false"`, integers and reals via their default `Display`.
    fn to_canonical_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Double(d) => d.to_string(),
        }
    }

    /// Accessor rendering used by `get_string()`: booleans render as `"1"`/`"0"`,
    /// distinct from the wire form above.
    fn to_accessor_string(&self) -> String {
        match self {
            Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            other => other.to_canonical_string(),
        }
    }

    /// Converts a dynamic JSON value into a `Value`, rejecting anything that
    /// isn't one of the four supported primitive types.
    fn from_json(value: serde_json::Value) -> Result<Self, StampedValueError> {
        match value {
            serde_json::Value::Null => Err(StampedValueError::BadValue),
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Bool(b) => Ok(Value::Boolean(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Double(f))
                } else {
                    Err(StampedValueError::TypeError {
                        expected: ValueKind::Integer,
                        found: ValueKind::Double,
                    })
                }
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err(StampedValueError::TypeError {
                    expected: ValueKind::String,
                    found: ValueKind::String,
                })
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StampedValueError {
    #[error("value is absent or null")]
    BadValue,
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeError { expected: ValueKind, found: ValueKind },
    #[error("invalid operation: no value has been loaded")]
    InvalidOperation,
}

/// A named primitive value with a last-modification timestamp and revision.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedValue {
    name: String,
    value: Option<Value>,
    modified_at: DateTime<Utc>,
    revision: u64,
}

impl StampedValue {
    /// Creates a new stamped value. Fails with [`StampedValueError::BadValue`]
    /// if `value` is JSON `null`, or [`StampedValueError::TypeError`] if it is
    /// not one of the four supported primitive types (array/object).
    pub fn create(
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<Self, StampedValueError> {
        let value = Value::from_json(value)?;
        Ok(Self {
            name: name.into(),
            value: Some(value),
            modified_at: Utc::now(),
            revision: 0,
        })
    }

    /// Wraps an already-typed [`Value`], as the inverse of [`StampedValue::to_element`].
    pub fn from_element(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            modified_at: Utc::now(),
            revision: 0,
        }
    }

    /// Constructs a stamped value with no value loaded yet (the absent state
    /// accessors can observe via [`StampedValueError::InvalidOperation`]).
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            modified_at: Utc::now(),
            revision: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replaces the value, bumping the modification timestamp and revision.
    pub fn set(&mut self, value: serde_json::Value) -> Result<(), StampedValueError> {
        self.value = Some(Value::from_json(value)?);
        self.revision += 1;
        self.modified_at = Utc::now();
        Ok(())
    }

    pub fn get_type(&self) -> Result<ValueKind, StampedValueError> {
        self.value
            .as_ref()
            .map(Value::kind)
            .ok_or(StampedValueError::InvalidOperation)
    }

    pub fn get_string(&self) -> Result<String, StampedValueError> {
        self.value
            .as_ref()
            .map(Value::to_accessor_string)
            .ok_or(StampedValueError::InvalidOperation)
    }

    pub fn get_integer(&self) -> Result<i64, StampedValueError> {
        match &self.value {
            Some(Value::Integer(i)) => Ok(*i),
            Some(other) => Err(StampedValueError::TypeError {
                expected: ValueKind::Integer,
                found: other.kind(),
            }),
            None => Err(StampedValueError::InvalidOperation),
        }
    }

    pub fn get_bool(&self) -> Result<bool, StampedValueError> {
        match &self.value {
            Some(Value::Boolean(b)) => Ok(*b),
            Some(other) => Err(StampedValueError::TypeError {
                expected: ValueKind::Boolean,
                found: other.kind(),
            }),
            None => Err(StampedValueError::InvalidOperation),
        }
    }

    pub fn get_double(&self) -> Result<f64, StampedValueError> {
        match &self.value {
            Some(Value::Double(d)) => Ok(*d),
            Some(other) => Err(StampedValueError::TypeError {
                expected: ValueKind::Double,
                found: other.kind(),
            }),
            None => Err(StampedValueError::InvalidOperation),
        }
    }

    /// Parses the canonical string representation back into `requested`.
    /// Fails with [`StampedValueError::BadValue`] on lexical failure.
    pub fn to_element(&self, requested: ValueKind) -> Result<Value, StampedValueError> {
        let value = self.value.as_ref().ok_or(StampedValueError::InvalidOperation)?;
        let s = value.to_canonical_string();
        match requested {
            ValueKind::String => Ok(Value::String(s)),
            ValueKind::Integer => s.parse::<i64>().map(Value::Integer).map_err(|_| StampedValueError::BadValue),
            ValueKind::Boolean => match s.as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(StampedValueError::BadValue),
            },
            ValueKind::Double => s.parse::<f64>().map(Value::Double).map_err(|_| StampedValueError::BadValue),
        }
    }

    /// The `(name, type-tag, textual-value, modification-timestamp)` wire
    /// representation described in spec §6.
    pub fn to_wire(&self) -> Option<WireStampedValue> {
        self.value.as_ref().map(|v| WireStampedValue {
            name: self.name.clone(),
            value_type: v.kind(),
            value: v.to_canonical_string(),
            modified_at: self.modified_at,
        })
    }

    pub fn from_wire(wire: WireStampedValue) -> Result<Self, StampedValueError> {
        let value = match wire.value_type {
            ValueKind::String => Value::String(wire.value),
            ValueKind::Integer => wire
                .value
                .parse()
                .map(Value::Integer)
                .map_err(|_| StampedValueError::BadValue)?,
            ValueKind::Boolean => match wire.value.as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => return Err(StampedValueError::BadValue),
            },
            ValueKind::Double => wire
                .value
                .parse()
                .map(Value::Double)
                .map_err(|_| StampedValueError::BadValue)?,
        };
        Ok(Self {
            name: wire.name,
            value: Some(value),
            modified_at: wire.modified_at,
            revision: 0,
        })
    }
}

/// On-the-wire envelope for a [`StampedValue`], per spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireStampedValue {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueKind,
    pub value: String,
    pub modified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_null() {
        let err = StampedValue::create("x", serde_json::Value::Null).unwrap_err();
        assert_eq!(err, StampedValueError::BadValue);
    }

    #[test]
    fn create_rejects_arrays_and_objects() {
        assert!(StampedValue::create("x", serde_json::json!([1, 2])).is_err());
        assert!(StampedValue::create("x", serde_json::json!({"a": 1})).is_err());
    }

    #[test]
    fn absent_value_fails_invalid_operation() {
        let v = StampedValue::absent("renew-timer");
        assert_eq!(v.get_type().unwrap_err(), StampedValueError::InvalidOperation);
        assert_eq!(v.get_integer().unwrap_err(), StampedValueError::InvalidOperation);
    }

    // scenario 1 from spec.md §8
    #[test]
    fn integer_value_scenario() {
        let v = StampedValue::create("renew-timer", serde_json::json!(1000)).unwrap();
        assert_eq!(v.get_integer().unwrap(), 1000);
        assert_eq!(v.get_string().unwrap(), "1000");
        assert_eq!(
            v.get_bool().unwrap_err(),
            StampedValueError::TypeError {
                expected: ValueKind::Boolean,
                found: ValueKind::Integer
            }
        );
    }

    #[test]
    fn get_string_succeeds_for_every_kind() {
        let s = StampedValue::create("s", serde_json::json!("hi")).unwrap();
        let i = StampedValue::create("i", serde_json::json!(42)).unwrap();
        let b = StampedValue::create("b", serde_json::json!(true)).unwrap();
        let d = StampedValue::create("d", serde_json::json!(1.5)).unwrap();

        assert_eq!(s.get_string().unwrap(), "hi");
        assert_eq!(i.get_string().unwrap(), "42");
        assert_eq!(b.get_string().unwrap(), "1"); // accessor form, not wire form
        assert_eq!(d.get_string().unwrap(), "1.5");
    }

    #[test]
    fn wire_boolean_uses_true_false() {
        let b = StampedValue::create("b", serde_json::json!(false)).unwrap();
        let wire = b.to_wire().unwrap();
        assert_eq!(wire.value, "false");
    }

    // round-trip property from spec.md §8
    #[test]
    fn to_element_from_element_round_trip() {
        for (kind, json) in [
            (ValueKind::String, serde_json::json!("abc")),
            (ValueKind::Integer, serde_json::json!(7)),
            (ValueKind::Boolean, serde_json::json!(true)),
            (ValueKind::Double, serde_json::json!(3.25)),
        ] {
            let v = StampedValue::create("p", json).unwrap();
            let elem = v.to_element(kind).unwrap();
            let roundtripped = StampedValue::from_element("p", elem.clone());
            assert_eq!(roundtripped.to_element(kind).unwrap(), elem);
        }
    }

    #[test]
    fn to_element_bad_lexical_value_fails() {
        let v = StampedValue::create("x", serde_json::json!("not a number")).unwrap();
        assert_eq!(
            v.to_element(ValueKind::Integer).unwrap_err(),
            StampedValueError::BadValue
        );
    }

    #[test]
    fn set_bumps_revision_and_timestamp() {
        let mut v = StampedValue::create("x", serde_json::json!(1)).unwrap();
        let first_stamp = v.modified_at();
        std::thread::sleep(std::time::Duration::from_millis(2));
        v.set(serde_json::json!(2)).unwrap();
        assert_eq!(v.revision(), 1);
        assert!(v.modified_at() >= first_stamp);
        assert_eq!(v.get_integer().unwrap(), 2);
    }

    #[test]
    fn wire_round_trip_preserves_value_and_timestamp() {
        let v = StampedValue::create("renew-timer", serde_json::json!(1000)).unwrap();
        let wire = v.to_wire().unwrap();
        let json = serde_json::to_string(&wire).unwrap();
        let decoded: WireStampedValue = serde_json::from_str(&json).unwrap();
        let restored = StampedValue::from_wire(decoded).unwrap();
        assert_eq!(restored.get_integer().unwrap(), 1000);
        assert_eq!(restored.modified_at(), v.modified_at());
    }
}
