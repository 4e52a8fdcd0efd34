//! Error types for the refinement engine
//!
//! Only run-level problems are errors. Row-level problems (bad cells,
//! missing values, coordinates outside the boundary) are routed into
//! partitions and counted in the report instead.

use crate::report::RefinementReport;
use thiserror::Error;

/// Fatal refinement error
#[derive(Debug, Error)]
pub enum RefineError {
    /// Bad configuration or polygon, raised before any row is processed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Empty or malformed input table
    #[error("Input error: {0}")]
    Input(String),

    /// Observer requested a stop; carries the counts gathered so far
    #[error("Refinement cancelled")]
    Cancelled { partial: Box<RefinementReport> },
}

impl RefineError {
    /// Report built before the pass stopped, if any rows were processed
    pub fn partial_report(&self) -> Option<&RefinementReport> {
        match self {
            RefineError::Cancelled { partial } if partial.total_rows > 0 => Some(partial.as_ref()),
            _ => None,
        }
    }
}
