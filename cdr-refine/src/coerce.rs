//! Per-cell type coercion
//!
//! Each coercer takes one raw string and yields a typed value, `Null` for
//! blank input, or a `CoercionFailure` carrying the original text. A failure
//! never aborts the row; the engine tallies it and nulls the cell.

use crate::model::Value;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Date-only formats, tried in order
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y"];

/// Formats carrying a time of day, tried in order
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Target type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionKind {
    /// Keep the raw text
    None,
    Date,
    Int,
    Float,
    Bool,
}

/// A cell that could not be converted to its column's kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot read {original:?} as {kind:?}")]
pub struct CoercionFailure {
    pub kind: CoercionKind,
    pub original: String,
}

/// Accepted boolean spellings (compared case-insensitively)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolTokens {
    #[serde(default = "default_truthy")]
    pub truthy: Vec<String>,
    #[serde(default = "default_falsy")]
    pub falsy: Vec<String>,
}

fn default_truthy() -> Vec<String> {
    ["yes", "true", "y", "1", "t"].iter().map(|s| s.to_string()).collect()
}

fn default_falsy() -> Vec<String> {
    ["no", "false", "n", "0", "f"].iter().map(|s| s.to_string()).collect()
}

impl Default for BoolTokens {
    fn default() -> Self {
        Self {
            truthy: default_truthy(),
            falsy: default_falsy(),
        }
    }
}

/// Coerce one raw cell to `kind`
pub fn coerce(kind: CoercionKind, raw: &str, tokens: &BoolTokens) -> Result<Value, CoercionFailure> {
    match kind {
        CoercionKind::None => Ok(Value::from_raw(raw)),
        CoercionKind::Date => coerce_date(raw),
        CoercionKind::Int => coerce_int(raw),
        CoercionKind::Float => coerce_float(raw),
        CoercionKind::Bool => coerce_bool(raw, tokens),
    }
}

fn failure(kind: CoercionKind, raw: &str) -> CoercionFailure {
    CoercionFailure {
        kind,
        original: raw.to_string(),
    }
}

pub fn coerce_date(raw: &str) -> Result<Value, CoercionFailure> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(Value::Date(date));
        }
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Value::Timestamp(ts));
        }
    }

    Err(failure(CoercionKind::Date, raw))
}

pub fn coerce_int(raw: &str) -> Result<Value, CoercionFailure> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }

    strip_thousands(text)
        .and_then(|digits| digits.parse::<i64>().ok())
        .map(Value::Int)
        .ok_or_else(|| failure(CoercionKind::Int, raw))
}

pub fn coerce_float(raw: &str) -> Result<Value, CoercionFailure> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }

    strip_thousands(text)
        .and_then(|digits| digits.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(Value::Float)
        .ok_or_else(|| failure(CoercionKind::Float, raw))
}

pub fn coerce_bool(raw: &str, tokens: &BoolTokens) -> Result<Value, CoercionFailure> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }

    if tokens.truthy.iter().any(|t| t.eq_ignore_ascii_case(text)) {
        Ok(Value::Bool(true))
    } else if tokens.falsy.iter().any(|t| t.eq_ignore_ascii_case(text)) {
        Ok(Value::Bool(false))
    } else {
        Err(failure(CoercionKind::Bool, raw))
    }
}

/// Remove `,` thousands separators when the grouping is well formed
///
/// `1,234,567.5` becomes `1234567.5`; `12,34` is rejected.
fn strip_thousands(text: &str) -> Option<String> {
    if !text.contains(',') {
        return Some(text.to_string());
    }

    let unsigned = text.trim_start_matches(['+', '-']);
    let integer_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == ','))
        .unwrap_or(unsigned.len());
    let (integer_part, rest) = unsigned.split_at(integer_end);
    if rest.contains(',') {
        return None;
    }

    let mut groups = integer_part.split(',');
    let first = groups.next()?;
    if first.is_empty() || first.len() > 3 {
        return None;
    }
    if !groups.all(|g| g.len() == 3) {
        return None;
    }

    Some(text.replace(',', ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bool_tokens() {
        let tokens = BoolTokens::default();
        assert_eq!(coerce_bool("Y", &tokens), Ok(Value::Bool(true)));
        assert_eq!(coerce_bool("0", &tokens), Ok(Value::Bool(false)));
        assert_eq!(coerce_bool("", &tokens), Ok(Value::Null));
        assert_eq!(coerce_bool("  TRUE ", &tokens), Ok(Value::Bool(true)));
        let err = coerce_bool("maybe", &tokens).unwrap_err();
        assert_eq!(err.kind, CoercionKind::Bool);
        assert_eq!(err.original, "maybe");
    }

    #[test]
    fn test_bool_custom_tokens() {
        let tokens = BoolTokens {
            truthy: vec!["si".into()],
            falsy: vec!["non".into()],
        };
        assert_eq!(coerce_bool("SI", &tokens), Ok(Value::Bool(true)));
        assert!(coerce_bool("yes", &tokens).is_err());
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(coerce_date("2024-01-04"), Ok(Value::Date(date(2024, 1, 4))));
        assert_eq!(coerce_date("01/05/2024"), Ok(Value::Date(date(2024, 1, 5))));
        assert_eq!(coerce_date("06-Jan-2024"), Ok(Value::Date(date(2024, 1, 6))));
        assert_eq!(
            coerce_date("2024-01-04 13:45"),
            Ok(Value::Timestamp(date(2024, 1, 4).and_hms_opt(13, 45, 0).unwrap()))
        );
        assert_eq!(
            coerce_date("2024-01-04T13:45:10"),
            Ok(Value::Timestamp(date(2024, 1, 4).and_hms_opt(13, 45, 10).unwrap()))
        );
        assert_eq!(
            coerce_date("01/05/2024 08:00:00"),
            Ok(Value::Timestamp(date(2024, 1, 5).and_hms_opt(8, 0, 0).unwrap()))
        );
    }

    #[test]
    fn test_date_blank_and_failure() {
        assert_eq!(coerce_date("   "), Ok(Value::Null));
        assert!(coerce_date("last tuesday").is_err());
        assert!(coerce_date("2024-13-40").is_err());
    }

    #[test]
    fn test_int_with_separators() {
        assert_eq!(coerce_int(" 1,234 "), Ok(Value::Int(1234)));
        assert_eq!(coerce_int("-12"), Ok(Value::Int(-12)));
        assert_eq!(coerce_int(""), Ok(Value::Null));
        assert!(coerce_int("12,34").is_err());
        assert!(coerce_int("1.5").is_err());
        assert!(coerce_int("n/a").is_err());
    }

    #[test]
    fn test_float_with_separators() {
        assert_eq!(coerce_float("1,234,567.25"), Ok(Value::Float(1_234_567.25)));
        assert_eq!(coerce_float("-97.5"), Ok(Value::Float(-97.5)));
        assert_eq!(coerce_float("3"), Ok(Value::Float(3.0)));
        assert!(coerce_float("NaN").is_err());
        assert!(coerce_float("inf").is_err());
        assert!(coerce_float("1.2.3").is_err());
    }

    #[test]
    fn test_none_keeps_text() {
        let tokens = BoolTokens::default();
        assert_eq!(coerce(CoercionKind::None, "Main St", &tokens), Ok(Value::Text("Main St".into())));
        assert_eq!(coerce(CoercionKind::None, "", &tokens), Ok(Value::Null));
    }
}
