//! Execution run tracking.
//!
//! A run is one execution attempt of an uploaded capsule, capturing:
//!
//! - **Bindings**: the parameter values, input files, and ports the request
//!   supplied
//! - **Progress**: `started`/`done` flags plus runner-reported percent and
//!   text
//! - **Log**: an append-only byte sequence with offset-based incremental
//!   reads
//!
//! A run owns its children exclusively; their lifetime equals the run's.
//! Success and failure are distinguished through the progress text and log
//! content, not a separate state enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use capsa_core::{RunId, UploadId};

/// A parameter value bound to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValue {
    /// Declared parameter name.
    pub name: String,
    /// Supplied value.
    pub value: String,
}

/// An input file bound to a run.
///
/// Content-addressed in blob storage; the row itself is per-run (no
/// row-level dedup, only the storage key dedups).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFile {
    /// Hex digest of the file's content hash.
    pub hash: String,
    /// Declared input name the file was supplied for.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
}

/// An output file recorded by the runner after execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFile {
    /// Hex digest of the file's content hash.
    pub hash: String,
    /// Declared output name.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
}

/// A TCP port to expose for interactive access to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPort {
    /// Port number, validated into [1, 65535].
    pub port_number: u16,
}

/// One execution attempt of an uploaded capsule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// Store-assigned row id.
    pub id: RunId,
    /// Content hash of the experiment being run.
    pub experiment_hash: String,
    /// The upload this run was requested from.
    pub upload_id: UploadId,
    /// IP address the run request came from.
    pub submitted_ip: String,
    /// Parameter values bound at creation.
    pub parameter_values: Vec<ParameterValue>,
    /// Input files bound at creation.
    pub input_files: Vec<InputFile>,
    /// Output files recorded by the runner.
    pub output_files: Vec<OutputFile>,
    /// Ports to expose.
    pub ports: Vec<RunPort>,
    /// Whether execution has begun.
    pub started: bool,
    /// Whether execution has finished (success or failure).
    pub done: bool,
    /// Runner-reported progress percentage in [0, 100].
    pub progress_percent: u8,
    /// Runner-reported progress text; empty until the runner sets one.
    pub progress_text: String,
    /// Append-only execution log.
    pub log: String,
    /// When the run row was created.
    pub created_at: DateTime<Utc>,
}

impl Run {
    /// Returns log content at or after the byte offset.
    ///
    /// An offset at or past the end returns the empty string. The log is
    /// append-only, so the same offset against unchanged state always
    /// returns identical bytes.
    #[must_use]
    pub fn log_from(&self, offset: usize) -> &str {
        let mut offset = offset;
        if offset >= self.log.len() {
            return "";
        }
        while !self.log.is_char_boundary(offset) {
            offset += 1;
        }
        &self.log[offset..]
    }

    /// Returns the progress percent and text shown to pollers.
    ///
    /// `done` always wins. Otherwise runner-set text (with its stored
    /// percent) takes precedence over the derived mapping; with no explicit
    /// text the status derives from the flags alone.
    #[must_use]
    pub fn status(&self) -> (u8, String) {
        if self.done {
            (100, "Completed".to_string())
        } else if self.progress_text.is_empty() {
            if self.started {
                (40, "Starting".to_string())
            } else {
                (0, "Queued".to_string())
            }
        } else {
            (self.progress_percent, self.progress_text.clone())
        }
    }

    /// Builds the polling report for this run.
    #[must_use]
    pub fn status_report(&self, log_from: usize) -> RunStatus {
        let (progress_percent, progress_text) = self.status();
        RunStatus {
            started: self.started,
            done: self.done,
            log: self.log_from(log_from).to_string(),
            progress_percent,
            progress_text,
        }
    }
}

/// Polling contract returned for a run status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    /// Whether execution has begun.
    pub started: bool,
    /// Whether execution has finished.
    pub done: bool,
    /// Log content from the requested offset.
    pub log: String,
    /// Progress percentage in [0, 100].
    pub progress_percent: u8,
    /// Human-readable progress text.
    pub progress_text: String,
}
