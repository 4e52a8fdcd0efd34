//! Refinement engine
//!
//! One pass over a raw table: normalize headers, coerce configured columns,
//! drop rows missing required values, classify coordinates against the
//! boundary, fill defaults, then deduplicate the survivors. Every source row
//! ends up in exactly one of the kept, excluded or dropped partitions.

use crate::boundary::{Location, Polygon};
use crate::coerce::coerce;
use crate::config::{RefinementConfig, ResolvedConfig};
use crate::dedupe::dedupe;
use crate::error::RefineError;
use crate::fill::fill_defaults;
use crate::headers::{normalize_headers, HeaderMapping};
use crate::model::{IndexedRow, RawTable, Row, Value};
use crate::report::{RefinementReport, ReportBuilder};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Rows processed between observer callbacks
pub const BATCH_SIZE: usize = 250;

/// Pipeline stage, reported to observers as the pass advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    Filter,
    Deduplicate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Normalize => "normalizing headers",
            Stage::Filter => "coercing and filtering rows",
            Stage::Deduplicate => "removing duplicates",
        };
        f.write_str(label)
    }
}

/// Progress sink and stop switch for a refinement pass
///
/// `should_stop` is consulted between batches and between stages, never in
/// the middle of a row.
pub trait RefineObserver: Send + Sync {
    fn stage(&self, _stage: Stage) {}

    fn progress(&self, _processed: usize, _total: usize) {}

    fn should_stop(&self) -> bool {
        false
    }
}

/// Observer that ignores everything
pub struct NoopObserver;

impl RefineObserver for NoopObserver {}

/// Why a row was excluded by the boundary filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    OutsideBoundary,
    InvalidCoordinate,
}

/// Why a row was dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    MissingRequired { column: String },
    Duplicate { first_index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedRow {
    #[serde(flatten)]
    pub row: IndexedRow,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    #[serde(flatten)]
    pub row: IndexedRow,
    pub reason: DropReason,
}

/// Output of one pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Refinement {
    /// Raw header → canonical name, in source order
    #[serde(skip)]
    pub headers: Vec<HeaderMapping>,
    /// Canonical columns of kept rows: source columns then filled defaults
    pub columns: Vec<String>,
    pub kept: Vec<IndexedRow>,
    pub excluded: Vec<ExcludedRow>,
    pub dropped: Vec<DroppedRow>,
    pub report: RefinementReport,
}

/// Engine bound to one validated configuration
#[derive(Debug, Clone)]
pub struct Refiner {
    config: ResolvedConfig,
}

impl Refiner {
    pub fn new(config: &RefinementConfig) -> Result<Self, RefineError> {
        Ok(Self {
            config: config.resolve()?,
        })
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn refine(&self, table: &RawTable, polygon: &Polygon) -> Result<Refinement, RefineError> {
        self.refine_observed(table, polygon, &NoopObserver)
    }

    pub fn refine_observed(
        &self,
        table: &RawTable,
        polygon: &Polygon,
        observer: &dyn RefineObserver,
    ) -> Result<Refinement, RefineError> {
        if table.headers.is_empty() {
            return Err(RefineError::Input("source has no headers".to_string()));
        }
        if table.row_count() == 0 {
            return Err(RefineError::Input("source has no rows".to_string()));
        }

        observer.stage(Stage::Normalize);
        let headers = normalize_headers(&table.headers);
        let canonical: Vec<&str> = headers.iter().map(|m| m.canonical.as_str()).collect();
        for coord in [&self.config.latitude, &self.config.longitude] {
            if !canonical.contains(&coord.as_str()) {
                return Err(RefineError::Config(format!(
                    "coordinate column '{}' not found in headers",
                    coord
                )));
            }
        }
        for required in self.config.required() {
            if !canonical.contains(&required) {
                warn!(column = required, "Required column missing from source; every row will be dropped");
            }
        }

        let mut report = ReportBuilder::new();
        if observer.should_stop() {
            return Err(cancelled(&report));
        }

        observer.stage(Stage::Filter);
        let kinds: Vec<_> = canonical.iter().map(|c| self.config.kind_of(c)).collect();
        let total = table.row_count();
        let mut survivors: Vec<IndexedRow> = Vec::with_capacity(total);
        let mut excluded: Vec<ExcludedRow> = Vec::new();
        let mut dropped: Vec<DroppedRow> = Vec::new();

        for batch_start in (0..total).step_by(BATCH_SIZE) {
            let batch_end = (batch_start + BATCH_SIZE).min(total);
            for index in batch_start..batch_end {
                report.row_seen();

                let mut cells = Vec::with_capacity(canonical.len());
                for (pos, column) in canonical.iter().enumerate() {
                    let raw = table.cell(index, pos);
                    let value = match coerce(kinds[pos], raw, &self.config.bool_tokens) {
                        Ok(value) => value,
                        Err(_) => {
                            report.coercion_failed(column);
                            Value::Null
                        }
                    };
                    cells.push((column.to_string(), value));
                }
                let row = Row::new(cells);

                if let Some(column) = self.config.required().find(|c| row.is_blank(c)) {
                    report.missing_required();
                    dropped.push(DroppedRow {
                        row: IndexedRow::new(index, row),
                        reason: DropReason::MissingRequired {
                            column: column.to_string(),
                        },
                    });
                    continue;
                }

                let lat = row.get(&self.config.latitude).and_then(Value::as_f64);
                let lon = row.get(&self.config.longitude).and_then(Value::as_f64);
                let reason = match polygon.classify(lat, lon) {
                    Location::Inside => None,
                    Location::Outside => {
                        report.outside_boundary();
                        Some(ExclusionReason::OutsideBoundary)
                    }
                    Location::Unlocatable => {
                        report.invalid_coordinate();
                        Some(ExclusionReason::InvalidCoordinate)
                    }
                };
                if let Some(reason) = reason {
                    excluded.push(ExcludedRow {
                        row: IndexedRow::new(index, row),
                        reason,
                    });
                    continue;
                }

                let (row, filled) = fill_defaults(&row, &self.config.defaults);
                for column in &filled {
                    report.default_filled(column);
                }
                survivors.push(IndexedRow::new(index, row));
            }

            observer.progress(batch_end, total);
            if observer.should_stop() {
                debug!(processed = batch_end, total, "Refinement stopped between batches");
                return Err(cancelled(&report));
            }
        }

        observer.stage(Stage::Deduplicate);
        let (kept, duplicates) = dedupe(&self.config.dedupe_on, survivors);
        for duplicate in duplicates {
            report.duplicate();
            dropped.push(DroppedRow {
                row: duplicate.row,
                reason: DropReason::Duplicate {
                    first_index: duplicate.first_index,
                },
            });
        }
        dropped.sort_by_key(|d| d.row.source_index);
        report.kept(kept.len());

        let mut columns: Vec<String> = canonical.iter().map(|c| c.to_string()).collect();
        for (column, _) in &self.config.defaults {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }

        let report = report.finish();
        debug!(
            total = report.total_rows,
            kept = report.kept_rows,
            excluded = excluded.len(),
            dropped = dropped.len(),
            "Refinement pass complete"
        );

        Ok(Refinement {
            headers,
            columns,
            kept,
            excluded,
            dropped,
            report,
        })
    }
}

fn cancelled(report: &ReportBuilder) -> RefineError {
    RefineError::Cancelled {
        partial: Box::new(report.snapshot()),
    }
}

/// One-shot refinement for previews and the CLI
pub fn refine(
    table: &RawTable,
    config: &RefinementConfig,
    polygon: &Polygon,
) -> Result<Refinement, RefineError> {
    Refiner::new(config)?.refine(table, polygon)
}
