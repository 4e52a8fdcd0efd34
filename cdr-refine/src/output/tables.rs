use super::OutputError;
use crate::engine::{DropReason, ExcludedRow, ExclusionReason, Refinement};
use crate::model::{IndexedRow, Row};
use std::path::Path;

const SOURCE_ROW: &str = "source_row";
const REASON: &str = "reason";

fn cells(row: &Row, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| row.get(c).map(ToString::to_string).unwrap_or_default())
        .collect()
}

/// Kept rows under the refined column order
pub fn write_refined_table(
    path: &Path,
    columns: &[String],
    rows: &[IndexedRow],
) -> Result<(), OutputError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns)?;
    for indexed in rows {
        writer.write_record(cells(&indexed.row, columns))?;
    }
    writer.flush()?;
    Ok(())
}

fn drop_reason(reason: &DropReason) -> String {
    match reason {
        DropReason::MissingRequired { column } => format!("missing required {column}"),
        DropReason::Duplicate { first_index } => {
            format!("duplicate of source row {}", first_index + 1)
        }
    }
}

fn exclusion_reason(reason: ExclusionReason) -> &'static str {
    match reason {
        ExclusionReason::OutsideBoundary => "outside boundary",
        ExclusionReason::InvalidCoordinate => "invalid coordinates",
    }
}

/// Every row that was not kept, in source order, with a reason column
pub fn write_excluded_table(
    path: &Path,
    columns: &[String],
    refinement: &Refinement,
) -> Result<(), OutputError> {
    let mut rows: Vec<(&IndexedRow, String)> = refinement
        .excluded
        .iter()
        .map(|e| (&e.row, exclusion_reason(e.reason).to_string()))
        .chain(refinement.dropped.iter().map(|d| (&d.row, drop_reason(&d.reason))))
        .collect();
    rows.sort_by_key(|(indexed, _)| indexed.source_index);

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec![SOURCE_ROW.to_string(), REASON.to_string()];
    header.extend(columns.iter().cloned());
    writer.write_record(&header)?;

    for (indexed, reason) in rows {
        let mut record = vec![(indexed.source_index + 1).to_string(), reason];
        record.extend(cells(&indexed.row, columns));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Rows whose coordinates were missing or unusable
pub fn write_invalid_table(
    path: &Path,
    columns: &[String],
    excluded: &[ExcludedRow],
) -> Result<(), OutputError> {
    let invalid: Vec<IndexedRow> = excluded
        .iter()
        .filter(|e| e.reason == ExclusionReason::InvalidCoordinate)
        .map(|e| e.row.clone())
        .collect();
    write_refined_table(path, columns, &invalid)
}
