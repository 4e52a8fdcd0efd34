//! Output writers
//!
//! A finished `Refinement` is written as a set of files into one directory:
//! the refined table, the excluded rows, rows without usable coordinates,
//! a KMZ of crash markers and an HTML map report.

mod map;
mod markers;
mod tables;

pub use map::{write_map_report, MapCounts};
pub use markers::{write_markers, Placemark};
pub use tables::{write_excluded_table, write_invalid_table, write_refined_table};

use crate::boundary::Polygon;
use crate::config::ResolvedConfig;
use crate::engine::Refinement;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Map report file name, fixed so front ends can link to it
pub const MAP_REPORT_NAME: &str = "Crash Data Refiner Map Report.html";

/// Rows without valid coordinates
pub const INVALID_TABLE_NAME: &str = "Crashes Without Valid Lat-Long Data.csv";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("KMZ error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Output cancelled")]
    Cancelled,
}

/// One written file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputFile {
    pub name: String,
    pub size: u64,
}

impl OutputFile {
    pub fn from_path(path: &Path) -> Result<Self, OutputError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = std::fs::metadata(path)?.len();
        Ok(Self { name, size })
    }
}

/// What a writer produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub files: Vec<OutputFile>,
    pub placemarks: Option<usize>,
    pub map_report: Option<String>,
}

/// Everything a writer needs for one run
pub struct OutputContext<'a> {
    pub refinement: &'a Refinement,
    pub polygon: &'a Polygon,
    pub config: &'a ResolvedConfig,
    /// Input file stem used to name outputs
    pub stem: &'a str,
    pub dir: &'a Path,
}

/// Called after each file; returning an error stops the writer
pub type Checkpoint<'a> = dyn FnMut(&OutputFile) -> Result<(), OutputError> + 'a;

pub trait OutputWriter: Send + Sync {
    fn write(
        &self,
        ctx: &OutputContext<'_>,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<Manifest, OutputError>;
}

/// Writes the standard file set
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOutputWriter;

pub fn refined_table_name(stem: &str) -> String {
    format!("{stem}_refined.csv")
}

pub fn excluded_table_name(stem: &str) -> String {
    format!("{stem}_excluded.csv")
}

pub fn markers_name(stem: &str) -> String {
    format!("{stem}_Crash Data.kmz")
}

impl OutputWriter for FileOutputWriter {
    fn write(
        &self,
        ctx: &OutputContext<'_>,
        checkpoint: &mut Checkpoint<'_>,
    ) -> Result<Manifest, OutputError> {
        let mut manifest = Manifest::default();
        let refinement = ctx.refinement;

        let path = ctx.dir.join(refined_table_name(ctx.stem));
        write_refined_table(&path, &refinement.columns, &refinement.kept)?;
        record(&path, &mut manifest, checkpoint)?;

        let path = ctx.dir.join(excluded_table_name(ctx.stem));
        write_excluded_table(&path, &refinement.columns, refinement)?;
        record(&path, &mut manifest, checkpoint)?;

        let path = ctx.dir.join(INVALID_TABLE_NAME);
        write_invalid_table(&path, &refinement.columns, &refinement.excluded)?;
        record(&path, &mut manifest, checkpoint)?;

        let path = ctx.dir.join(markers_name(ctx.stem));
        let placemarks = write_markers(
            &path,
            &refinement.kept,
            &ctx.config.latitude,
            &ctx.config.longitude,
            ctx.config.label_order,
        )?;
        manifest.placemarks = Some(placemarks);
        record(&path, &mut manifest, checkpoint)?;

        let path = ctx.dir.join(MAP_REPORT_NAME);
        let report = &refinement.report;
        write_map_report(
            &path,
            ctx.polygon,
            &refinement.kept,
            &ctx.config.latitude,
            &ctx.config.longitude,
            MapCounts {
                included: report.kept_rows,
                excluded: report.excluded_outside_boundary,
                invalid: report.excluded_invalid_coordinate,
            },
        )?;
        manifest.map_report = Some(MAP_REPORT_NAME.to_string());
        record(&path, &mut manifest, checkpoint)?;

        Ok(manifest)
    }
}

fn record(
    path: &Path,
    manifest: &mut Manifest,
    checkpoint: &mut Checkpoint<'_>,
) -> Result<(), OutputError> {
    let file = OutputFile::from_path(path)?;
    checkpoint(&file)?;
    manifest.files.push(file);
    Ok(())
}
