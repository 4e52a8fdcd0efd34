use super::{is_blank_record, RowSource, SourceError};
use crate::model::RawTable;
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::Timelike;
use std::path::{Path, PathBuf};

/// First worksheet of an Excel workbook, first row as headers
#[derive(Debug, Clone)]
pub struct XlsxSource {
    path: PathBuf,
}

impl XlsxSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn first_sheet(&self) -> Result<Range<Data>, SourceError> {
        let mut workbook = open_workbook_auto(&self.path).map_err(|e| {
            SourceError::Spreadsheet(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        workbook
            .worksheet_range_at(0)
            .ok_or_else(|| SourceError::Spreadsheet("workbook has no worksheets".to_string()))?
            .map_err(|e| SourceError::Spreadsheet(e.to_string()))
    }
}

/// Render a cell the way it reads in the sheet
fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => render_float(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => format!("#ERR:{e:?}"),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) if ts.num_seconds_from_midnight() == 0 => ts.format("%Y-%m-%d").to_string(),
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.to_string(),
        },
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// Integral floats lose the `.0` Excel stores them with
fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

impl RowSource for XlsxSource {
    fn read(&self) -> Result<RawTable, SourceError> {
        let range = self.first_sheet()?;
        let mut rows = range.rows();

        let headers: Vec<String> = rows
            .next()
            .map(|r| r.iter().map(|c| render_cell(c).trim().to_string()).collect())
            .unwrap_or_default();

        let records: Vec<Vec<String>> = rows
            .map(|r| r.iter().map(render_cell).collect::<Vec<_>>())
            .filter(|r| !is_blank_record(r))
            .collect();

        tracing::debug!(path = %self.path.display(), rows = records.len(), "Read workbook");
        Ok(RawTable::new(headers, records))
    }
}
