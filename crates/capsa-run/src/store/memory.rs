//! In-memory run store implementation for testing.
//!
//! This module provides [`InMemoryRunStore`], a simple in-memory
//! implementation of the [`RunStore`] trait suitable for testing and
//! development.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process
//!   coordination
//! - **Single-process only**: State is not shared across process boundaries

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use capsa_core::RunId;

use super::{NewRun, RunStore};
use crate::error::{Error, Result};
use crate::run::{OutputFile, Run};

/// Internal state protected by a single lock.
#[derive(Debug, Default)]
struct RunState {
    runs: BTreeMap<i64, Run>,
    next_run_id: i64,
}

/// In-memory run store for testing.
///
/// Thread-safe via `RwLock`; every mutator takes the write lock for its
/// whole operation, so inserts are atomic and readers always see either the
/// full run or nothing.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    state: RwLock<RunState>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("run store lock poisoned")
}

impl InMemoryRunStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of run rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn run_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.runs.len())
    }

    fn with_run<T>(&self, run_id: RunId, apply: impl FnOnce(&mut Run) -> T) -> Result<T> {
        let mut state = self.state.write().map_err(poison_err)?;
        let run = state
            .runs
            .get_mut(&run_id.as_i64())
            .ok_or(Error::RunNotFound { run_id })?;
        let result = apply(run);
        drop(state);
        Ok(result)
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert_run(&self, new_run: NewRun) -> Result<Run> {
        let mut state = self.state.write().map_err(poison_err)?;
        let id = state.next_run_id;
        state.next_run_id += 1;

        let run = Run {
            id: RunId::new(id),
            experiment_hash: new_run.experiment_hash,
            upload_id: new_run.upload_id,
            submitted_ip: new_run.submitted_ip,
            parameter_values: new_run.parameter_values,
            input_files: new_run.input_files,
            output_files: Vec::new(),
            ports: new_run.ports,
            started: false,
            done: false,
            progress_percent: 0,
            progress_text: String::new(),
            log: String::new(),
            created_at: Utc::now(),
        };
        state.runs.insert(id, run.clone());
        drop(state);
        Ok(run)
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<Run>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.runs.get(&run_id.as_i64()).cloned())
    }

    async fn mark_started(&self, run_id: RunId) -> Result<()> {
        self.with_run(run_id, |run| run.started = true)
    }

    async fn append_log(&self, run_id: RunId, chunk: &str) -> Result<()> {
        self.with_run(run_id, |run| run.log.push_str(chunk))
    }

    async fn set_progress(&self, run_id: RunId, percent: u8, text: &str) -> Result<()> {
        self.with_run(run_id, |run| {
            run.progress_percent = percent.min(100);
            run.progress_text = text.to_string();
        })
    }

    async fn record_output(&self, run_id: RunId, output: OutputFile) -> Result<()> {
        self.with_run(run_id, |run| run.output_files.push(output))
    }

    async fn mark_done(&self, run_id: RunId) -> Result<()> {
        self.with_run(run_id, |run| run.done = true)
    }

    async fn check(&self) -> Result<()> {
        let _guard = self.state.read().map_err(poison_err)?;
        Ok(())
    }
}
