//! Scalar kinds and typed scalar values.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;
use uuid::Uuid;

/// The scalar kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScalarType {
    Boolean,
    Float,
    Decimal,
    Integer,
    String,
    Guid,
    DateTime,
    /// Not a scalar; the field points at an object or enum type.
    #[default]
    None,
}

impl ScalarType {
    /// Returns true for kinds that support ordering operators.
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            ScalarType::Float | ScalarType::Decimal | ScalarType::Integer | ScalarType::DateTime
        )
    }

    /// The name the scalar is published under in the merged schema.
    pub fn graph_name(self) -> &'static str {
        match self {
            ScalarType::Boolean => "Boolean",
            ScalarType::Float => "Float",
            ScalarType::Decimal => "Decimal",
            ScalarType::Integer => "Int",
            ScalarType::String => "String",
            ScalarType::Guid => "Guid",
            ScalarType::DateTime => "DateTime",
            ScalarType::None => "None",
        }
    }
}

/// A typed scalar value read from a provider object.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScalarValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Guid(Uuid),
    DateTime(DateTime<Utc>),
}

impl ScalarValue {
    /// Coerces a JSON literal into a value of the given kind.
    ///
    /// Returns `None` when the literal cannot represent the kind. JSON `null`
    /// always coerces to [`ScalarValue::Null`].
    pub fn from_json(kind: ScalarType, value: &Value) -> Option<Self> {
        if value.is_null() {
            return Some(ScalarValue::Null);
        }

        match kind {
            ScalarType::Boolean => match value {
                Value::Bool(b) => Some(ScalarValue::Boolean(*b)),
                Value::String(s) => s.parse().ok().map(ScalarValue::Boolean),
                _ => None,
            },
            ScalarType::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(ScalarValue::Integer),
                Value::String(s) => s.parse().ok().map(ScalarValue::Integer),
                _ => None,
            },
            ScalarType::Float => match value {
                Value::Number(n) => n.as_f64().map(ScalarValue::Float),
                Value::String(s) => s.parse().ok().map(ScalarValue::Float),
                _ => None,
            },
            ScalarType::Decimal => match value {
                Value::Number(n) => Decimal::from_str(&n.to_string())
                    .ok()
                    .or_else(|| n.as_f64().and_then(Decimal::from_f64))
                    .map(ScalarValue::Decimal),
                Value::String(s) => Decimal::from_str(s).ok().map(ScalarValue::Decimal),
                _ => None,
            },
            ScalarType::String => match value {
                Value::String(s) => Some(ScalarValue::String(s.clone())),
                Value::Number(n) => Some(ScalarValue::String(n.to_string())),
                Value::Bool(b) => Some(ScalarValue::String(b.to_string())),
                _ => None,
            },
            ScalarType::Guid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(ScalarValue::Guid),
            ScalarType::DateTime => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| ScalarValue::DateTime(d.with_timezone(&Utc))),
            ScalarType::None => None,
        }
    }

    /// Converts the value to its JSON representation.
    pub fn to_json(&self) -> Value {
        match self {
            ScalarValue::Null => Value::Null,
            ScalarValue::Boolean(b) => Value::Bool(*b),
            ScalarValue::Integer(i) => Value::from(*i),
            ScalarValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ScalarValue::Decimal(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(d.to_string())),
            ScalarValue::String(s) => Value::String(s.clone()),
            ScalarValue::Guid(g) => Value::String(g.to_string()),
            ScalarValue::DateTime(d) => Value::String(d.to_rfc3339()),
        }
    }

    /// Returns true for [`ScalarValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Returns the string payload of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Compares two values of compatible kinds.
    ///
    /// Integers, floats and decimals compare numerically with each other.
    /// Values of unrelated kinds and nulls mixed with non-nulls are unordered.
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        use ScalarValue as V;
        match (self, other) {
            (V::Null, V::Null) => Some(Ordering::Equal),
            (V::Boolean(a), V::Boolean(b)) => a.partial_cmp(b),
            (V::Integer(a), V::Integer(b)) => a.partial_cmp(b),
            (V::Float(a), V::Float(b)) => a.partial_cmp(b),
            (V::Integer(a), V::Float(b)) => (*a as f64).partial_cmp(b),
            (V::Float(a), V::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (V::Decimal(a), V::Decimal(b)) => a.partial_cmp(b),
            (V::Decimal(a), V::Integer(b)) => a.partial_cmp(&Decimal::from(*b)),
            (V::Integer(a), V::Decimal(b)) => Decimal::from(*a).partial_cmp(b),
            (V::Decimal(a), V::Float(b)) => a.to_f64().and_then(|a| a.partial_cmp(b)),
            (V::Float(a), V::Decimal(b)) => b.to_f64().and_then(|b| a.partial_cmp(&b)),
            (V::String(a), V::String(b)) => a.partial_cmp(b),
            (V::Guid(a), V::Guid(b)) => a.partial_cmp(b),
            (V::DateTime(a), V::DateTime(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Integer(i64::from(value))
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<u32> for ScalarValue {
    fn from(value: u32) -> Self {
        ScalarValue::Integer(i64::from(value))
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<Decimal> for ScalarValue {
    fn from(value: Decimal) -> Self {
        ScalarValue::Decimal(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<Uuid> for ScalarValue {
    fn from(value: Uuid) -> Self {
        ScalarValue::Guid(value)
    }
}

impl From<DateTime<Utc>> for ScalarValue {
    fn from(value: DateTime<Utc>) -> Self {
        ScalarValue::DateTime(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ScalarValue::Null, Into::into)
    }
}
