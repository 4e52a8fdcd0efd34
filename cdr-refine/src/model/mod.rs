//! Tabular data model shared by every pipeline stage

mod row;
mod value;

pub use row::{IndexedRow, Row};
pub use value::Value;

/// Raw table as produced by a row source: headers plus string records
///
/// Records may be shorter than the header list; missing trailing cells
/// read as blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self { headers, records }
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// Cell text at `(record, column)`, blank when the record is short
    pub fn cell(&self, record: usize, column: usize) -> &str {
        self.records
            .get(record)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}
