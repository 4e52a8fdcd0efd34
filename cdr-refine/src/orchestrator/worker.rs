//! Background execution of one run
//!
//! The worker owns every mutation of its run's state. Output is written into
//! `<run dir>/.partial/` and moved into the run directory only after the
//! last file is written, so a cancelled or failed run never exposes a
//! partial file set.

use super::run::{build_metrics, LogLevel, RunStatus};
use super::{mirror, RunHandle, RunRequest};
use crate::boundary::Polygon;
use crate::config::ResolvedConfig;
use crate::engine::{RefineObserver, Refinement, Refiner, Stage};
use crate::error::RefineError;
use crate::model::RawTable;
use crate::output::{Manifest, OutputContext, OutputError, OutputFile, OutputWriter};
use crate::report::RefinementReport;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const STAGING_DIR: &str = ".partial";

/// How a run ended, before it is recorded
enum Outcome {
    Success {
        manifest: Manifest,
        report: RefinementReport,
    },
    Cancelled {
        report: Option<RefinementReport>,
    },
    Failed {
        error: String,
        report: Option<RefinementReport>,
    },
}

impl Outcome {
    fn failed(error: impl ToString) -> Self {
        Outcome::Failed {
            error: error.to_string(),
            report: None,
        }
    }
}

/// Engine observer that narrates progress into the run log
struct RunObserver<'a> {
    handle: &'a RunHandle,
}

impl RefineObserver for RunObserver<'_> {
    fn stage(&self, stage: Stage) {
        let text = stage.to_string();
        let mut chars = text.chars();
        let text = match chars.next() {
            Some(first) => format!("{}{}...", first.to_uppercase(), chars.as_str()),
            None => text,
        };
        self.handle.log(LogLevel::Info, &text);
    }

    fn progress(&self, processed: usize, total: usize) {
        self.handle
            .log(LogLevel::Info, &format!("Processed {processed} of {total} rows."));
    }

    fn should_stop(&self) -> bool {
        self.handle.cancel.is_cancelled()
    }
}

/// Run the pipeline to completion and record the terminal state
pub(super) fn execute(handle: &RunHandle, request: RunRequest, writer: Arc<dyn OutputWriter>) {
    {
        let mut state = handle.write();
        state.transition_to(RunStatus::Running);
        state.message = "Running".to_string();
    }
    handle.log(
        LogLevel::Info,
        &format!("Starting refinement for {}", request.inputs.data_file),
    );

    let outcome = pipeline(handle, &request, writer.as_ref());
    finish(handle, outcome);
}

fn pipeline(handle: &RunHandle, request: &RunRequest, writer: &dyn OutputWriter) -> Outcome {
    if handle.cancel.is_cancelled() {
        return Outcome::Cancelled { report: None };
    }

    let refiner = match Refiner::new(&request.config) {
        Ok(refiner) => refiner,
        Err(e) => return Outcome::failed(e),
    };

    let polygon: Polygon = match request.boundary.load() {
        Ok(polygon) => polygon,
        Err(e) => return Outcome::failed(e),
    };
    handle.log(
        LogLevel::Info,
        &format!("Loaded boundary polygon ({} vertices).", polygon.vertex_count()),
    );
    if handle.cancel.is_cancelled() {
        return Outcome::Cancelled { report: None };
    }

    let table: RawTable = match request.data.read() {
        Ok(table) => table,
        Err(e) => return Outcome::failed(e),
    };
    handle.log(
        LogLevel::Info,
        &format!("Loaded {} crash rows.", table.row_count()),
    );
    if handle.cancel.is_cancelled() {
        return Outcome::Cancelled { report: None };
    }

    let observer = RunObserver { handle };
    let refinement = match refiner.refine_observed(&table, &polygon, &observer) {
        Ok(refinement) => refinement,
        Err(RefineError::Cancelled { partial }) => {
            let report = (partial.total_rows > 0).then_some(*partial);
            return Outcome::Cancelled { report };
        }
        Err(e) => return Outcome::failed(e),
    };
    let report = refinement.report.clone();
    handle.log(
        LogLevel::Info,
        &format!(
            "Boundary filter complete: {} included, {} excluded, {} invalid.",
            report.kept_rows, report.excluded_outside_boundary, report.excluded_invalid_coordinate
        ),
    );
    if report.dropped_missing_required + report.dropped_duplicate > 0 {
        handle.log(
            LogLevel::Info,
            &format!(
                "Dropped {} rows missing required values and {} duplicates.",
                report.dropped_missing_required, report.dropped_duplicate
            ),
        );
    }
    for (column, count) in &report.coercion_failures {
        handle.log(
            LogLevel::Warn,
            &format!("{count} values in '{column}' could not be converted."),
        );
    }
    if handle.cancel.is_cancelled() {
        return Outcome::Cancelled {
            report: Some(report),
        };
    }

    let staging = handle.dir.join(STAGING_DIR);
    let written = write_outputs(handle, request, writer, &refinement, &polygon, refiner.config(), &staging);
    let published = written.and_then(|manifest| {
        // Last point a cancel can take effect; once publishing starts the run succeeds
        if handle.cancel.is_cancelled() {
            return Err(OutputError::Cancelled);
        }
        publish(&staging, &handle.dir, manifest)
    });
    let manifest = match published {
        Ok(manifest) => manifest,
        Err(OutputError::Cancelled) => {
            discard(&staging);
            return Outcome::Cancelled {
                report: Some(report),
            };
        }
        Err(e) => {
            discard(&staging);
            return Outcome::Failed {
                error: e.to_string(),
                report: Some(report),
            };
        }
    };

    Outcome::Success { manifest, report }
}

fn write_outputs(
    handle: &RunHandle,
    request: &RunRequest,
    writer: &dyn OutputWriter,
    refinement: &Refinement,
    polygon: &Polygon,
    config: &ResolvedConfig,
    staging: &Path,
) -> Result<Manifest, OutputError> {
    std::fs::create_dir_all(staging)?;
    let ctx = OutputContext {
        refinement,
        polygon,
        config,
        stem: &request.stem,
        dir: staging,
    };

    writer.write(&ctx, &mut |file: &OutputFile| -> Result<(), OutputError> {
        if handle.cancel.is_cancelled() {
            return Err(OutputError::Cancelled);
        }
        handle.log(LogLevel::Info, &format!("Saved {}", file.name));
        Ok(())
    })
}

/// Move staged files into the run directory; all or nothing
fn publish(staging: &Path, dir: &Path, manifest: Manifest) -> Result<Manifest, OutputError> {
    for (moved, file) in manifest.files.iter().enumerate() {
        if let Err(e) = std::fs::rename(staging.join(&file.name), dir.join(&file.name)) {
            for published in &manifest.files[..moved] {
                let _ = std::fs::remove_file(dir.join(&published.name));
            }
            return Err(e.into());
        }
    }
    std::fs::remove_dir_all(staging)?;
    Ok(manifest)
}

fn discard(staging: &Path) {
    if let Err(e) = std::fs::remove_dir_all(staging) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %staging.display(), error = %e, "Failed to remove staged outputs");
        }
    }
}

/// Record the terminal state and its closing log line under one lock
fn finish(handle: &RunHandle, outcome: Outcome) {
    let (status, level, added) = {
        let mut state = handle.write();
        let (level, text) = match outcome {
            Outcome::Success { manifest, report } => {
                state.transition_to(RunStatus::Success);
                state.message = "Refinement complete.".to_string();
                let duration = Some(state.duration());
                state.metrics = build_metrics(&report, manifest.placemarks, duration);
                state.manifest = manifest;
                state.report = Some(report);
                (LogLevel::Info, state.message.clone())
            }
            Outcome::Cancelled { report } => {
                state.transition_to(RunStatus::Cancelled);
                state.message = "Refinement cancelled.".to_string();
                state.metrics = report
                    .as_ref()
                    .map(|r| build_metrics(r, None, None))
                    .unwrap_or_default();
                state.report = report;
                (LogLevel::Warn, state.message.clone())
            }
            Outcome::Failed { error, report } => {
                state.transition_to(RunStatus::Failed);
                state.message = "Refinement failed.".to_string();
                state.metrics = report
                    .as_ref()
                    .map(|r| build_metrics(r, None, None))
                    .unwrap_or_default();
                state.report = report;
                let text = format!("Error: {error}");
                state.error = Some(error);
                (LogLevel::Error, text)
            }
        };
        let added = state.log.append(level, &text);
        (state.status, level, added)
    };

    mirror(handle.id, level, &added);
    info!(run_id = %handle.id, status = ?status, "Run finished");
}

/// Record a worker that died without reporting
pub(super) fn record_crash(handle: &RunHandle, error: String) {
    if handle.read().is_terminal() {
        return;
    }
    discard(&handle.dir.join(STAGING_DIR));
    finish(
        handle,
        Outcome::Failed {
            error,
            report: None,
        },
    );
}
