//! Dynamically typed cell values.
//!
//! # Responsibility
//! - Carry column values between entities, filters, records and SQL binds.
//! - Define the one total order used by every backend when sorting.
//!
//! # Invariants
//! - `Bool`, `Integer` and `Real` share the numeric storage class and compare
//!   numerically with each other.
//! - Storage classes order as `Null < numeric < text < blob`.
//! - Only `Integer`, `Text` and `Blob` (and `Bool`, as an integer) can act as
//!   entity keys.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// One column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Short lowercase name of the storage class, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    fn class_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) | Self::Integer(_) | Self::Real(_) => 1,
            Self::Text(_) => 2,
            Self::Blob(_) => 3,
        }
    }

    /// Total order across all values.
    ///
    /// `Null` sorts lowest here; callers that need nulls-last placement
    /// handle nulls before delegating.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        let rank = self.class_rank().cmp(&other.class_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Self::Text(left), Self::Text(right)) => left.as_bytes().cmp(right.as_bytes()),
            (Self::Blob(left), Self::Blob(right)) => left.cmp(right),
            (Self::Null, Self::Null) => Ordering::Equal,
            (left, right) => compare_numeric(left, right),
        }
    }

    /// Comparison used by filters: `None` when either side is `Null`.
    pub fn filter_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.total_cmp(other))
    }
}

fn compare_numeric(left: &Value, right: &Value) -> Ordering {
    match (numeric_parts(left), numeric_parts(right)) {
        (Numeric::Int(a), Numeric::Int(b)) => a.cmp(&b),
        (Numeric::Int(a), Numeric::Real(b)) => (a as f64).total_cmp(&b),
        (Numeric::Real(a), Numeric::Int(b)) => a.total_cmp(&(b as f64)),
        (Numeric::Real(a), Numeric::Real(b)) => a.total_cmp(&b),
    }
}

enum Numeric {
    Int(i64),
    Real(f64),
}

fn numeric_parts(value: &Value) -> Numeric {
    match value {
        Value::Bool(flag) => Numeric::Int(i64::from(*flag)),
        Value::Integer(number) => Numeric::Int(*number),
        Value::Real(number) => Numeric::Real(*number),
        _ => Numeric::Int(0),
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Real(number) => write!(f, "{number}"),
            Self::Text(text) => write!(f, "'{text}'"),
            Self::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Conversion from a stored value back into a Rust field type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Integer(number) => Ok(*number),
            Value::Bool(flag) => Ok(i64::from(*flag)),
            other => Err(format!("expected integer, got {}", other.type_name())),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| format!("integer {wide} out of range for i32"))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let wide = i64::from_value(value)?;
        u32::try_from(wide).map_err(|_| format!("integer {wide} out of range for u32"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Real(number) => Ok(*number),
            Value::Integer(number) => Ok(*number as f64),
            other => Err(format!("expected real, got {}", other.type_name())),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(flag) => Ok(*flag),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            other => Err(format!("expected bool, got {other}")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(text) => Ok(text.clone()),
            other => Err(format!("expected text, got {}", other.type_name())),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Blob(bytes) => Ok(bytes.clone()),
            other => Err(format!("expected blob, got {}", other.type_name())),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self, String> {
        let text = String::from_value(value)?;
        Uuid::parse_str(&text).map_err(|_| format!("invalid uuid value `{text}`"))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

/// Hashable, totally ordered form of an entity key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Integer(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl KeyValue {
    /// Converts a column value into a key, rejecting nulls and reals.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(number) => Some(Self::Integer(*number)),
            Value::Bool(flag) => Some(Self::Integer(i64::from(*flag))),
            Value::Text(text) => Some(Self::Text(text.clone())),
            Value::Blob(bytes) => Some(Self::Blob(bytes.clone())),
            Value::Null | Value::Real(_) => None,
        }
    }
}

impl From<KeyValue> for Value {
    fn from(value: KeyValue) -> Self {
        match value {
            KeyValue::Integer(number) => Self::Integer(number),
            KeyValue::Text(text) => Self::Text(text),
            KeyValue::Blob(bytes) => Self::Blob(bytes),
        }
    }
}

impl Display for KeyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(number) => write!(f, "{number}"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FromValue, KeyValue, Value};
    use std::cmp::Ordering;
    use uuid::Uuid;

    #[test]
    fn numbers_compare_across_integer_and_real() {
        assert_eq!(
            Value::Integer(2).total_cmp(&Value::Real(2.5)),
            Ordering::Less
        );
        assert_eq!(
            Value::Bool(true).total_cmp(&Value::Integer(1)),
            Ordering::Equal
        );
    }

    #[test]
    fn storage_classes_order_null_numeric_text_blob() {
        let mut values = vec![
            Value::Blob(vec![0]),
            Value::Text("a".to_string()),
            Value::Integer(99),
            Value::Null,
        ];
        values.sort_by(Value::total_cmp);
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Integer(99),
                Value::Text("a".to_string()),
                Value::Blob(vec![0]),
            ]
        );
    }

    #[test]
    fn filter_cmp_is_undefined_for_nulls() {
        assert_eq!(Value::Null.filter_cmp(&Value::Integer(1)), None);
        assert_eq!(Value::Integer(1).filter_cmp(&Value::Null), None);
    }

    #[test]
    fn optional_fields_read_null_as_none() {
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value(&Value::from("x")).unwrap(),
            Some("x".to_string())
        );
        assert!(i64::from_value(&Value::from("x")).is_err());
    }

    #[test]
    fn reals_and_nulls_are_not_keys() {
        assert_eq!(KeyValue::from_value(&Value::Real(1.0)), None);
        assert_eq!(KeyValue::from_value(&Value::Null), None);
        assert_eq!(
            KeyValue::from_value(&Value::Integer(7)),
            Some(KeyValue::Integer(7))
        );
    }

    #[test]
    fn uuids_travel_as_text_keys() {
        let id = Uuid::new_v4();
        let value = Value::from(id);
        assert_eq!(Uuid::from_value(&value).unwrap(), id);
        assert_eq!(
            KeyValue::from_value(&value),
            Some(KeyValue::Text(id.to_string()))
        );
        assert!(Uuid::from_value(&Value::from("not-a-uuid")).is_err());
    }

    #[test]
    fn values_serialize_with_a_type_tag() {
        let json = serde_json::to_string(&Value::Integer(3)).unwrap();
        assert_eq!(json, r#"{"type":"integer","value":3}"#);
        let back: Value = serde_json::from_str(r#"{"type":"null"}"#).unwrap();
        assert_eq!(back, Value::Null);
    }
}
