//! Crash data refinement library
//!
//! Exposes the synchronous refinement pipeline and the run orchestrator used
//! by the `crash-refiner` CLI and the web service.

pub mod boundary;
pub mod coerce;
pub mod config;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod fill;
pub mod headers;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod report;
pub mod source;

pub use crate::boundary::{GeoPoint, Location, Polygon};
pub use crate::config::{LabelOrder, RefinementConfig, ResolvedConfig};
pub use crate::engine::{refine, Refinement, Refiner};
pub use crate::error::RefineError;
pub use crate::model::{IndexedRow, RawTable, Row, Value};
pub use crate::orchestrator::{Orchestrator, OrchestratorError, RunRequest, RunStatus};
pub use crate::report::RefinementReport;
