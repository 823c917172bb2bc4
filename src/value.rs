use std::fmt;
use std::str::FromStr;

use serde::ser::{Serialize, Serializer};

use crate::{Error, Result};

/// An owned dynamically typed value, as decoded from a native result row or
/// bound to a statement parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// The value types known to the native layer. The discriminants are the
/// parameter-type codes of the native enumeration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer = 1,
    Float = 2,
    Text = 3,
    Blob = 4,
    Null = 5,
}

impl ValueType {
    /// The tag the native layer uses for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Null => "null",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl TryFrom<i32> for ValueType {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            1 => Ok(ValueType::Integer),
            2 => Ok(ValueType::Float),
            3 => Ok(ValueType::Text),
            4 => Ok(ValueType::Blob),
            5 => Ok(ValueType::Null),
            other => Err(Error::InvalidValueType(other)),
        }
    }
}

/// Parses a native type tag. Tags are matched case-insensitively, and `real`
/// is accepted as a spelling of `float`.
impl FromStr for ValueType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<ValueType, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integer" => Ok(ValueType::Integer),
            "float" | "real" => Ok(ValueType::Float),
            "text" => Ok(ValueType::Text),
            "blob" => Ok(ValueType::Blob),
            "null" => Ok(ValueType::Null),
            _ => Err(()),
        }
    }
}

impl Value {
    /// Returns `true` if the value is [`Null`].
    ///
    /// [`Null`]: Value::Null
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn data_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Integer(_) => ValueType::Integer,
            Value::Real(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
        }
    }

    pub fn as_integer(&self) -> Option<&i64> {
        if let Self::Integer(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_real(&self) -> Option<&f64> {
        if let Self::Real(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        if let Self::Text(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Self::Blob(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// The textual form of the value: decimal numbers, text as is, blobs as
    /// (lossy) UTF-8 and `NULL` as the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// Converts the value to the declared parameter type.
    ///
    /// Numeric conversions of text read the longest numeric prefix and fall
    /// back to zero. `Blob` leaves the value untouched and `Null` discards it.
    pub fn coerce(self, ty: ValueType) -> Value {
        match ty {
            ValueType::Integer => Value::Integer(match self {
                Value::Null => 0,
                Value::Integer(i) => i,
                Value::Real(f) => f as i64,
                Value::Text(s) => parse_integer(&s),
                Value::Blob(b) => parse_integer(&String::from_utf8_lossy(&b)),
            }),
            ValueType::Float => Value::Real(match self {
                Value::Null => 0.0,
                Value::Integer(i) => i as f64,
                Value::Real(f) => f,
                Value::Text(s) => parse_float(&s),
                Value::Blob(b) => parse_float(&String::from_utf8_lossy(&b)),
            }),
            ValueType::Text => match self {
                Value::Text(s) => Value::Text(s),
                other => Value::Text(other.to_text()),
            },
            ValueType::Blob => self,
            ValueType::Null => Value::Null,
        }
    }
}

fn numeric_prefix(s: &str, float: bool) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_dot = !float;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    &s[..end]
}

fn parse_integer(s: &str) -> i64 {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return i;
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return f as i64;
        }
    }
    numeric_prefix(s, false).parse().unwrap_or(0)
}

fn parse_float(s: &str) -> f64 {
    let trimmed = s.trim();
    if let Ok(f) = trimmed.parse::<f64>() {
        return f;
    }
    numeric_prefix(s, true).parse().unwrap_or(0.0)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => b.serialize(serializer),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Value {
        Value::Integer(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Value {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Value {
        Value::Integer(value as i64)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Value {
        Value::Real(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Value {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Value {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Value {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Value {
        Value::Text(value.clone())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Value {
        Value::Blob(value.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Value {
        Value::Blob(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Value {
        Value::Integer(value as i64)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}
