//! Run orchestrator
//!
//! Runs the refinement pipeline as a cancellable background job that any
//! number of pollers can observe. At most one run is active at a time; the
//! registry keeps finished runs until the session clears them.
//!
//! Locking: the registry map sits behind one `RwLock` and is held only for
//! lookups and admission. Each run's state sits behind its own `RwLock`,
//! written only by its worker (plus the `cancel` log line).

mod run;
mod worker;

pub use run::{
    build_metrics, LogEntry, LogLevel, LogPage, Metric, RunInputs, RunLog, RunSnapshot, RunState,
    RunStatus, RunSummary, MAX_LOG_ENTRIES,
};

use crate::config::RefinementConfig;
use crate::output::{FileOutputWriter, OutputWriter};
use crate::source::{open_data, KmzSource, PolygonSource, RowSource, SourceError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("A run is already in progress: {0}")]
    RunBusy(Uuid),

    #[error("Run not found: {0}")]
    NotFound(Uuid),

    #[error("Run has not finished: {0}")]
    NotReady(Uuid),

    #[error("Run already finished: {0}")]
    AlreadyFinished(Uuid),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Cannot prepare run directory: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Everything a run needs, handed over to its worker
pub struct RunRequest {
    pub data: Box<dyn RowSource + Send + Sync>,
    pub boundary: Box<dyn PolygonSource + Send + Sync>,
    pub config: RefinementConfig,
    pub inputs: RunInputs,
    /// Stem used to name output files
    pub stem: String,
}

impl RunRequest {
    /// Request reading a data file and a boundary file from disk
    pub fn from_files(
        data_path: &Path,
        boundary_path: &Path,
        config: RefinementConfig,
    ) -> std::result::Result<Self, SourceError> {
        let file_name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let stem = data_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "crashes".to_string());

        Ok(Self {
            data: open_data(data_path)?,
            boundary: Box::new(KmzSource::new(boundary_path)),
            inputs: RunInputs {
                data_file: file_name(data_path),
                boundary_file: file_name(boundary_path),
                lat_column: config.latitude_column.clone(),
                lon_column: config.longitude_column.clone(),
            },
            config,
            stem,
        })
    }
}

/// Shared handle to one run
pub(crate) struct RunHandle {
    id: Uuid,
    state: RwLock<RunState>,
    cancel: CancellationToken,
    dir: PathBuf,
}

impl RunHandle {
    fn read(&self) -> RwLockReadGuard<'_, RunState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the run log and mirror to tracing
    fn log(&self, level: LogLevel, text: &str) {
        let added = self.write().log.append(level, text);
        mirror(self.id, level, &added);
    }
}

/// Echo appended run log entries through tracing
fn mirror(run_id: Uuid, level: LogLevel, entries: &[LogEntry]) {
    for entry in entries {
        match level {
            LogLevel::Info => tracing::info!(run_id = %run_id, seq = entry.seq, "{}", entry.text),
            LogLevel::Warn => tracing::warn!(run_id = %run_id, seq = entry.seq, "{}", entry.text),
            LogLevel::Error => tracing::error!(run_id = %run_id, seq = entry.seq, "{}", entry.text),
        }
    }
}

fn active_run(runs: &HashMap<Uuid, Arc<RunHandle>>) -> Option<Uuid> {
    runs.values()
        .find(|h| !h.read().is_terminal())
        .map(|h| h.id)
}

/// Registry of runs plus the policy for starting them
pub struct Orchestrator {
    output_root: PathBuf,
    writer: Arc<dyn OutputWriter>,
    runs: RwLock<HashMap<Uuid, Arc<RunHandle>>>,
}

impl Orchestrator {
    pub fn new(output_root: PathBuf) -> Self {
        Self::with_writer(output_root, Arc::new(FileOutputWriter))
    }

    pub fn with_writer(output_root: PathBuf, writer: Arc<dyn OutputWriter>) -> Self {
        Self {
            output_root,
            writer,
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    fn runs_read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Arc<RunHandle>>> {
        self.runs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn runs_write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Arc<RunHandle>>> {
        self.runs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, id: Uuid) -> Result<Arc<RunHandle>> {
        self.runs_read()
            .get(&id)
            .cloned()
            .ok_or(OrchestratorError::NotFound(id))
    }

    /// Start a run in the background and return its id immediately
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: RunRequest) -> Result<Uuid> {
        let handle = {
            let mut runs = self.runs_write();
            if let Some(active) = active_run(&runs) {
                return Err(OrchestratorError::RunBusy(active));
            }

            let id = Uuid::new_v4();
            let dir = self.output_root.join(id.to_string());
            std::fs::create_dir_all(&dir)
                .map_err(|e| OrchestratorError::Io(format!("{}: {}", dir.display(), e)))?;

            let handle = Arc::new(RunHandle {
                id,
                state: RwLock::new(RunState::new(id, request.inputs.clone())),
                cancel: CancellationToken::new(),
                dir,
            });
            runs.insert(id, Arc::clone(&handle));
            handle
        };

        let id = handle.id;
        tracing::info!(run_id = %id, data_file = %request.inputs.data_file, "Run submitted");

        let writer = Arc::clone(&self.writer);
        tokio::spawn(async move {
            let worker_handle = Arc::clone(&handle);
            let joined = tokio::task::spawn_blocking(move || {
                worker::execute(&worker_handle, request, writer)
            })
            .await;

            if let Err(e) = joined {
                tracing::error!(run_id = %handle.id, error = %e, "Run worker crashed");
                worker::record_crash(&handle, format!("Worker crashed: {e}"));
            }
        });

        Ok(id)
    }

    /// Id of the pending or running run, if any
    pub fn active(&self) -> Option<Uuid> {
        active_run(&self.runs_read())
    }

    /// Log entries numbered after `since`
    pub fn poll_log(&self, id: Uuid, since: u64) -> Result<LogPage> {
        Ok(self.handle(id)?.read().log_page(since))
    }

    pub fn snapshot(&self, id: Uuid) -> Result<RunSnapshot> {
        Ok(self.handle(id)?.read().snapshot())
    }

    /// All known runs, oldest first
    pub fn list(&self) -> Vec<RunSnapshot> {
        let mut snapshots: Vec<RunSnapshot> = self
            .runs_read()
            .values()
            .map(|h| h.read().snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    pub fn get_result(&self, id: Uuid) -> Result<RunSummary> {
        let handle = self.handle(id)?;
        let state = handle.read();
        if !state.is_terminal() {
            return Err(OrchestratorError::NotReady(id));
        }
        Ok(state.summary())
    }

    /// Request cooperative cancellation
    pub fn cancel(&self, id: Uuid) -> Result<()> {
        let handle = self.handle(id)?;
        if handle.read().is_terminal() {
            return Err(OrchestratorError::AlreadyFinished(id));
        }
        if !handle.cancel.is_cancelled() {
            handle.cancel.cancel();
            handle.log(LogLevel::Warn, "Cancellation requested.");
        }
        Ok(())
    }

    /// Forget a finished run; its published files stay on disk
    pub fn clear(&self, id: Uuid) -> Result<()> {
        let mut runs = self.runs_write();
        let handle = runs.get(&id).ok_or(OrchestratorError::NotFound(id))?;
        if !handle.read().is_terminal() {
            return Err(OrchestratorError::NotReady(id));
        }
        runs.remove(&id);
        Ok(())
    }

    /// Forget every finished run; returns how many were removed
    pub fn clear_finished(&self) -> usize {
        let mut runs = self.runs_write();
        let before = runs.len();
        runs.retain(|_, h| !h.read().is_terminal());
        before - runs.len()
    }

    /// Directory holding the run's published files
    pub fn output_dir(&self, id: Uuid) -> Result<PathBuf> {
        Ok(self.handle(id)?.dir.clone())
    }

    /// Path of a published file, restricted to the run's manifest
    pub fn published_file(&self, id: Uuid, name: &str) -> Result<PathBuf> {
        let handle = self.handle(id)?;
        let listed = handle.read().manifest.files.iter().any(|f| f.name == name);
        let path = handle.dir.join(name);
        let contained = path.parent() == Some(handle.dir.as_path());
        if !listed || !contained || !path.is_file() {
            return Err(OrchestratorError::FileNotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Poll until the run reaches a terminal state
    pub async fn wait(&self, id: Uuid, interval: Duration) -> Result<RunSnapshot> {
        loop {
            let snapshot = self.snapshot(id)?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(interval).await;
        }
    }
}
