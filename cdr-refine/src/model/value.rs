//! Typed cell values

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;

/// A single cell after coercion
///
/// The set of kinds is closed: every pipeline stage sees exactly these
/// variants, so a column cannot silently drift from integer to text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Wrap raw source text, mapping the empty string to `Null`
    pub fn from_raw(text: &str) -> Self {
        if text.is_empty() {
            Value::Null
        } else {
            Value::Text(text.to_string())
        }
    }

    /// True for `Null` and whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view used for coordinates
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Type-tagged representation used as a dedupe key part
    ///
    /// Tagging keeps `Int(1)` and `Text("1")` distinct. Text is trimmed, the
    /// same way `is_blank` sees it.
    pub fn key_repr(&self) -> String {
        match self {
            Value::Null => "null:".to_string(),
            Value::Text(s) => format!("text:{}", s.trim()),
            Value::Int(i) => format!("int:{}", i),
            Value::Float(f) => format!("float:{}", f),
            Value::Bool(b) => format!("bool:{}", b),
            Value::Date(d) => format!("date:{}", d),
            Value::Timestamp(t) => format!("ts:{}", t),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}
