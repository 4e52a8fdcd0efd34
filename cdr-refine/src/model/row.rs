//! Ordered, immutable rows keyed by canonical column name

use super::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Ordered mapping from canonical column name to value
///
/// Stages never mutate a row in place; `with` returns a new row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new(cells: Vec<(String, Value)>) -> Self {
        Self { cells }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// True when the column is absent, null or blank text
    pub fn is_blank(&self, column: &str) -> bool {
        self.get(column).map_or(true, Value::is_blank)
    }

    /// Copy of this row with `column` set, appended if absent
    pub fn with(&self, column: &str, value: Value) -> Row {
        let mut cells = self.cells.clone();
        match cells.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => cells.push((column.to_string(), value)),
        }
        Row { cells }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A row tagged with its zero-based position in the source table
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IndexedRow {
    pub source_index: usize,
    pub row: Row,
}

impl IndexedRow {
    pub fn new(source_index: usize, row: Row) -> Self {
        Self { source_index, row }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::new(vec![
            ("id".to_string(), Value::Text("A".into())),
            ("city".to_string(), Value::Null),
        ])
    }

    #[test]
    fn test_with_replaces_without_touching_original() {
        let row = sample();
        let updated = row.with("city", Value::Text("Springfield".into()));

        assert_eq!(row.get("city"), Some(&Value::Null));
        assert_eq!(updated.get("city"), Some(&Value::Text("Springfield".into())));
        assert_eq!(updated.columns().collect::<Vec<_>>(), vec!["id", "city"]);
    }

    #[test]
    fn test_with_appends_missing_column() {
        let updated = sample().with("county", Value::Int(7));
        assert_eq!(updated.len(), 3);
        assert_eq!(updated.columns().last(), Some("county"));
    }

    #[test]
    fn test_is_blank_for_missing_and_null() {
        let row = sample();
        assert!(row.is_blank("city"));
        assert!(row.is_blank("nope"));
        assert!(!row.is_blank("id"));
    }

    #[test]
    fn test_serializes_in_column_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"{"id":"A","city":null}"#);
    }
}
