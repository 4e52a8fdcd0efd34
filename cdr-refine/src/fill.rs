//! Default-value gap filling

use crate::model::{Row, Value};

/// Apply defaults to missing or blank columns
///
/// Returns the new row and the columns that were filled. Present non-blank
/// values are left alone.
pub fn fill_defaults(row: &Row, defaults: &[(String, Value)]) -> (Row, Vec<String>) {
    let mut out = row.clone();
    let mut filled = Vec::new();

    for (column, value) in defaults {
        if out.is_blank(column) {
            out = out.with(column, value.clone());
            filled.push(column.clone());
        }
    }

    (out, filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_blank_and_missing() {
        let row = Row::new(vec![
            ("city".to_string(), Value::Null),
            ("county".to_string(), Value::Text("Polk".into())),
        ]);
        let defaults = vec![
            ("city".to_string(), Value::Text("Unknown".into())),
            ("county".to_string(), Value::Text("Unknown".into())),
            ("fatalities".to_string(), Value::Int(0)),
        ];

        let (filled, columns) = fill_defaults(&row, &defaults);
        assert_eq!(filled.get("city"), Some(&Value::Text("Unknown".into())));
        assert_eq!(filled.get("county"), Some(&Value::Text("Polk".into())));
        assert_eq!(filled.get("fatalities"), Some(&Value::Int(0)));
        assert_eq!(columns, vec!["city", "fatalities"]);
        assert_eq!(row.get("city"), Some(&Value::Null));
    }

    #[test]
    fn test_order_independent() {
        let row = Row::new(vec![("a".to_string(), Value::Null)]);
        let forward = vec![
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Int(2)),
        ];
        let reverse: Vec<_> = forward.iter().rev().cloned().collect();

        let (x, _) = fill_defaults(&row, &forward);
        let (y, _) = fill_defaults(&row, &reverse);
        for column in ["a", "b"] {
            assert_eq!(x.get(column), y.get(column));
        }
    }
}
