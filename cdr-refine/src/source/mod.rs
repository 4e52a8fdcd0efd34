//! File-format adapters feeding the engine
//!
//! `RowSource` turns a CSV or spreadsheet into a `RawTable`; `PolygonSource`
//! turns a KMZ/KML boundary into a `Polygon`. Both are plain traits so the
//! orchestrator and tests can supply in-memory inputs.

mod csv;
mod guess;
mod kmz;
mod xlsx;

pub use self::csv::CsvSource;
pub use guess::{guess_lat_lon, score_latitude_header, score_longitude_header, CoordinateGuess};
pub use kmz::{parse_kml, KmzSource};
pub use xlsx::XlsxSource;

use crate::boundary::Polygon;
use crate::model::RawTable;
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading input files
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unsupported file type: {0}")]
    FileFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Boundary file error: {0}")]
    Kmz(String),

    #[error("XML error: {0}")]
    Xml(String),
}

/// Produces raw headers and string records
pub trait RowSource {
    fn read(&self) -> Result<RawTable, SourceError>;

    /// Header row only, for previews
    fn headers(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.read()?.headers)
    }
}

/// Produces exactly one boundary polygon
pub trait PolygonSource {
    fn load(&self) -> Result<Polygon, SourceError>;
}

/// In-memory table, used for previews and tests
impl RowSource for RawTable {
    fn read(&self) -> Result<RawTable, SourceError> {
        Ok(self.clone())
    }
}

impl PolygonSource for Polygon {
    fn load(&self) -> Result<Polygon, SourceError> {
        Ok(self.clone())
    }
}

/// Accepted data file extensions
pub const DATA_EXTENSIONS: &[&str] = &["csv", "xlsx", "xlsm", "xls"];

/// Accepted boundary file extensions
pub const BOUNDARY_EXTENSIONS: &[&str] = &["kmz", "kml"];

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_data_file(path: &Path) -> bool {
    DATA_EXTENSIONS.contains(&extension_of(path).as_str())
}

pub fn is_boundary_file(path: &Path) -> bool {
    BOUNDARY_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Row source chosen from a path's extension
pub fn open_data(path: &Path) -> Result<Box<dyn RowSource + Send + Sync>, SourceError> {
    match extension_of(path).as_str() {
        "csv" => Ok(Box::new(CsvSource::new(path))),
        "xlsx" | "xlsm" | "xls" => Ok(Box::new(XlsxSource::new(path))),
        other => Err(SourceError::FileFormat(format!(".{}", other))),
    }
}

pub fn read_table(path: &Path) -> Result<RawTable, SourceError> {
    open_data(path)?.read()
}

pub fn read_headers(path: &Path) -> Result<Vec<String>, SourceError> {
    open_data(path)?.headers()
}

pub fn load_polygon(path: &Path) -> Result<Polygon, SourceError> {
    if !is_boundary_file(path) {
        return Err(SourceError::FileFormat(format!(".{}", extension_of(path))));
    }
    KmzSource::new(path).load()
}

/// Record with every cell blank
pub(crate) fn is_blank_record(record: &[String]) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}
