//! Refinement report
//!
//! Counts are accumulated by `ReportBuilder` during the pass and frozen into
//! a `RefinementReport` at the end (or at cancellation).

use serde::Serialize;
use std::collections::BTreeMap;

/// Frozen hygiene counts for one refinement pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefinementReport {
    pub total_rows: usize,
    pub kept_rows: usize,
    pub dropped_missing_required: usize,
    pub dropped_duplicate: usize,
    pub excluded_outside_boundary: usize,
    pub excluded_invalid_coordinate: usize,
    /// Canonical column → cells that failed coercion
    pub coercion_failures: BTreeMap<String, usize>,
    /// Canonical column → cells that received a default
    pub filled_defaults: BTreeMap<String, usize>,
}

impl RefinementReport {
    pub fn total_coercion_failures(&self) -> usize {
        self.coercion_failures.values().sum()
    }

    /// Rows accounted for by some partition
    pub fn accounted_rows(&self) -> usize {
        self.kept_rows
            + self.dropped_missing_required
            + self.dropped_duplicate
            + self.excluded_outside_boundary
            + self.excluded_invalid_coordinate
    }
}

/// Mutable accumulator owned by a single pass
#[derive(Debug, Default)]
pub struct ReportBuilder {
    report: RefinementReport,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_seen(&mut self) {
        self.report.total_rows += 1;
    }

    pub fn coercion_failed(&mut self, column: &str) {
        *self
            .report
            .coercion_failures
            .entry(column.to_string())
            .or_insert(0) += 1;
    }

    pub fn default_filled(&mut self, column: &str) {
        *self
            .report
            .filled_defaults
            .entry(column.to_string())
            .or_insert(0) += 1;
    }

    pub fn missing_required(&mut self) {
        self.report.dropped_missing_required += 1;
    }

    pub fn outside_boundary(&mut self) {
        self.report.excluded_outside_boundary += 1;
    }

    pub fn invalid_coordinate(&mut self) {
        self.report.excluded_invalid_coordinate += 1;
    }

    pub fn duplicate(&mut self) {
        self.report.dropped_duplicate += 1;
    }

    pub fn kept(&mut self, count: usize) {
        self.report.kept_rows += count;
    }

    /// Copy of the counts so far, used for partial reports
    pub fn snapshot(&self) -> RefinementReport {
        self.report.clone()
    }

    pub fn finish(self) -> RefinementReport {
        self.report
    }
}
