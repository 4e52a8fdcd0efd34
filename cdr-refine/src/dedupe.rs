//! Key-based deduplication

use crate::model::IndexedRow;
use std::collections::HashMap;

/// A later row sharing its key with an earlier kept row
#[derive(Debug, Clone, PartialEq)]
pub struct Duplicate {
    pub row: IndexedRow,
    /// `source_index` of the first row with the same key
    pub first_index: usize,
}

/// Keep the first row per key tuple, in input order
///
/// Rows with a blank value in any key column are always kept. An empty key
/// list keeps everything.
pub fn dedupe(keys: &[String], rows: Vec<IndexedRow>) -> (Vec<IndexedRow>, Vec<Duplicate>) {
    if keys.is_empty() {
        return (rows, Vec::new());
    }

    let mut first_seen: HashMap<Vec<String>, usize> = HashMap::new();
    let mut kept = Vec::with_capacity(rows.len());
    let mut dropped = Vec::new();

    for indexed in rows {
        let Some(key) = key_tuple(keys, &indexed) else {
            kept.push(indexed);
            continue;
        };

        match first_seen.get(&key) {
            Some(&first_index) => dropped.push(Duplicate {
                row: indexed,
                first_index,
            }),
            None => {
                first_seen.insert(key, indexed.source_index);
                kept.push(indexed);
            }
        }
    }

    (kept, dropped)
}

fn key_tuple(keys: &[String], indexed: &IndexedRow) -> Option<Vec<String>> {
    keys.iter()
        .map(|column| match indexed.row.get(column) {
            Some(value) if !value.is_blank() => Some(value.key_repr()),
            _ => None,
        })
        .collect()
}
