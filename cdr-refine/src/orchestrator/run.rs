//! Run state machine and sequence-numbered log
//!
//! pending → running → {success, failed, cancelled}

use crate::output::{Manifest, OutputFile};
use crate::report::RefinementReport;
use cdr_common::human_time::format_duration;
use cdr_common::time::{elapsed_seconds, now};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Entries retained per run; older ones are discarded first
pub const MAX_LOG_ENTRIES: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed | RunStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One log line; its content never changes once numbered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub text: String,
}

/// Append-only, bounded run log
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: VecDeque<LogEntry>,
    last_seq: u64,
    last_line: String,
}

impl RunLog {
    /// Append each non-blank line of `text`; returns the new entries
    pub fn append(&mut self, level: LogLevel, text: &str) -> Vec<LogEntry> {
        let ts = now();
        let mut added = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            self.last_seq += 1;
            let entry = LogEntry {
                seq: self.last_seq,
                ts,
                level,
                text: line.to_string(),
            };
            self.last_line = entry.text.clone();
            self.entries.push_back(entry.clone());
            added.push(entry);
        }
        while self.entries.len() > MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        added
    }

    /// Entries numbered after `seq`
    ///
    /// A caller that fell behind the retained window gets the whole window.
    pub fn since(&self, seq: u64) -> Vec<LogEntry> {
        self.entries.iter().filter(|e| e.seq > seq).cloned().collect()
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn last_line(&self) -> &str {
        &self.last_line
    }

    pub fn retained(&self) -> usize {
        self.entries.len()
    }
}

/// Input files and coordinate columns a run was started with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInputs {
    pub data_file: String,
    pub boundary_file: String,
    pub lat_column: String,
    pub lon_column: String,
}

/// Summary card shown by front ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
    pub detail: String,
}

impl Metric {
    fn new(label: &str, value: impl ToString, detail: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// Metric cards for a finished pass
pub fn build_metrics(
    report: &RefinementReport,
    placemarks: Option<usize>,
    duration: Option<String>,
) -> Vec<Metric> {
    let mut metrics = vec![
        Metric::new("Rows Scanned", report.total_rows, "Raw crash rows processed"),
        Metric::new("Included", report.kept_rows, "Inside boundary"),
        Metric::new("Excluded", report.excluded_outside_boundary, "Outside boundary"),
        Metric::new("Invalid", report.excluded_invalid_coordinate, "Missing coordinates"),
        Metric::new(
            "Dropped",
            report.dropped_missing_required + report.dropped_duplicate,
            "Missing required values or duplicates",
        ),
        Metric::new("Refined Rows", report.kept_rows, "Rows written"),
    ];
    if let Some(count) = placemarks {
        metrics.push(Metric::new("KMZ Placemarks", count, "Crash map markers"));
    }
    if let Some(duration) = duration {
        metrics.push(Metric::new("Run Duration", duration, "Pipeline runtime"));
    }
    metrics
}

/// Mutable state of one run, owned by the orchestrator
#[derive(Debug, Clone)]
pub struct RunState {
    pub id: Uuid,
    pub status: RunStatus,
    pub message: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub inputs: RunInputs,
    pub manifest: Manifest,
    pub report: Option<RefinementReport>,
    pub metrics: Vec<Metric>,
    pub log: RunLog,
}

impl RunState {
    pub fn new(id: Uuid, inputs: RunInputs) -> Self {
        Self {
            id,
            status: RunStatus::Pending,
            message: "Queued".to_string(),
            error: None,
            created_at: now(),
            started_at: None,
            finished_at: None,
            inputs,
            manifest: Manifest::default(),
            report: None,
            metrics: Vec::new(),
            log: RunLog::default(),
        }
    }

    /// Move to `status`, stamping start and finish times
    pub fn transition_to(&mut self, status: RunStatus) {
        self.status = status;
        match status {
            RunStatus::Running => self.started_at = Some(now()),
            s if s.is_terminal() => self.finished_at = Some(now()),
            _ => {}
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Formatted run time, empty until the run has finished
    pub fn duration(&self) -> String {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => format_duration(elapsed_seconds(start, end) as i64),
            _ => String::new(),
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            id: self.id,
            status: self.status,
            message: self.message.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration: self.duration(),
            inputs: self.inputs.clone(),
            outputs: self.manifest.files.clone(),
            log_count: self.log.last_seq(),
            last_log: self.log.last_line().to_string(),
        }
    }

    pub fn log_page(&self, since: u64) -> LogPage {
        LogPage {
            entries: self.log.since(since),
            last_seq: self.log.last_seq(),
            status: self.status,
            message: self.message.clone(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            id: self.id,
            status: self.status,
            error: self.error.clone(),
            manifest: self.manifest.clone(),
            map_report: self.manifest.map_report.clone(),
            report: self.report.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Read-only view for status polling
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub id: Uuid,
    pub status: RunStatus,
    pub message: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: String,
    pub inputs: RunInputs,
    pub outputs: Vec<OutputFile>,
    pub log_count: u64,
    pub last_log: String,
}

/// Incremental log response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    pub last_seq: u64,
    pub status: RunStatus,
    pub message: String,
}

/// Result of a terminal run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: Uuid,
    pub status: RunStatus,
    pub error: Option<String>,
    /// Empty unless the run succeeded
    pub manifest: Manifest,
    pub map_report: Option<String>,
    /// Present whenever rows were processed
    pub report: Option<RefinementReport>,
    pub metrics: Vec<Metric>,
}
