// Telesim - Device telemetry simulation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Data kinds and generated values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of data kinds a channel can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Float,
    Integer,
    Boolean,
    String,
}

impl DataKind {
    /// Float and Integer channels carry a numeric range.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataKind::Float | DataKind::Integer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Float => "float",
            DataKind::Integer => "integer",
            DataKind::Boolean => "boolean",
            DataKind::String => "string",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated value.
///
/// Serialized untagged so that the JSON carries plain scalars. Variant order
/// matters for deserialization: whole JSON numbers become `Integer`,
/// numbers with a fraction or exponent become `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn kind(&self) -> DataKind {
        match self {
            Value::Float(_) => DataKind::Float,
            Value::Integer(_) => DataKind::Integer,
            Value::Boolean(_) => DataKind::Boolean,
            Value::String(_) => DataKind::String,
        }
    }

    /// Numeric view used by analytics.
    ///
    /// Booleans map to 0/1; strings have no numeric view.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
