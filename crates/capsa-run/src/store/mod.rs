//! Pluggable storage for run state.
//!
//! The [`RunStore`] trait defines the persistence layer for runs and their
//! children. Two contracts matter:
//!
//! - **Atomic creation**: `insert_run` persists the run and all of its
//!   children in one commit; no partial run is ever observable by
//!   concurrent readers.
//! - **Monotonic log**: `append_log` only ever extends the log; offsets
//!   handed to pollers stay valid forever.
//!
//! The mutator set (`mark_started`, `append_log`, `set_progress`,
//! `record_output`, `mark_done`) is the surface the external runner reports
//! through while pollers read consistent snapshots via `get_run`.

pub mod memory;

use async_trait::async_trait;

use capsa_core::{RunId, UploadId};

use crate::error::Result;
use crate::run::{InputFile, OutputFile, ParameterValue, Run, RunPort};

/// Fields of a run row and its children before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewRun {
    /// Content hash of the experiment being run.
    pub experiment_hash: String,
    /// The upload this run was requested from.
    pub upload_id: UploadId,
    /// IP address the run request came from.
    pub submitted_ip: String,
    /// Parameter values bound by validation.
    pub parameter_values: Vec<ParameterValue>,
    /// Input files bound by validation.
    pub input_files: Vec<InputFile>,
    /// Ports to expose.
    pub ports: Vec<RunPort>,
}

/// Storage abstraction for run state.
///
/// All methods are `Send + Sync` to support concurrent access from
/// independent request tasks and the runner's progress reports.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts a run and all of its children in a single commit, assigning
    /// the next row id.
    ///
    /// The run starts not-started, not-done, with an empty log.
    async fn insert_run(&self, new_run: NewRun) -> Result<Run>;

    /// Gets a consistent snapshot of a run by id.
    ///
    /// Returns `None` if the run does not exist.
    async fn get_run(&self, run_id: RunId) -> Result<Option<Run>>;

    /// Marks a run as started.
    async fn mark_started(&self, run_id: RunId) -> Result<()>;

    /// Appends a chunk to the run's log.
    ///
    /// The log never shrinks and already-written ranges never change.
    async fn append_log(&self, run_id: RunId, chunk: &str) -> Result<()>;

    /// Sets the runner-reported progress percent and text.
    ///
    /// Percent is clamped into [0, 100].
    async fn set_progress(&self, run_id: RunId, percent: u8, text: &str) -> Result<()>;

    /// Records an output file produced by the run.
    async fn record_output(&self, run_id: RunId, output: OutputFile) -> Result<()>;

    /// Marks a run as done.
    ///
    /// Terminal for polling purposes; success and failure are told apart
    /// through the log and progress text already written.
    async fn mark_done(&self, run_id: RunId) -> Result<()>;

    /// Probes store connectivity for readiness reporting.
    async fn check(&self) -> Result<()>;
}
