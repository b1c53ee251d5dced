//! # capsa-run
//!
//! Run orchestration for Capsa: one execution attempt of an uploaded
//! capsule, from validated creation through polling to completion.
//!
//! This crate implements the execution side of the capsule lifecycle:
//!
//! - **Run Model**: a run with its bound parameter values, input files,
//!   ports, and runner-recorded outputs
//! - **Orchestrator**: five-step request validation, atomic persistence,
//!   fire-and-forget handoff to the external runner
//! - **Progress & Log**: append-only log with offset-based incremental
//!   reads and a derived human status
//! - **Dispatch**: the enqueue seam to the execution engine, with a bounded
//!   in-process queue and a recording test double
//!
//! ## Guarantees
//!
//! - No partial run is ever observable: validation happens before any
//!   persistence, and the run commits with all of its children
//! - The caller of run creation never waits on the runner; failures after
//!   commit land in the run's own log for pollers
//! - The log only ever grows; an offset handed to a poller stays valid
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use capsa_core::storage::MemoryObjectStore;
//! use capsa_run::dispatch::ChannelRunner;
//! use capsa_run::orchestrator::{RunOrchestrator, RunRequest};
//! use capsa_run::store::memory::InMemoryRunStore;
//!
//! # async fn example(upload: capsa_registry::Upload, experiment: capsa_registry::Experiment) -> capsa_run::Result<()> {
//! let (runner, _worker) = ChannelRunner::bounded(64);
//! let orchestrator = RunOrchestrator::new(
//!     Arc::new(InMemoryRunStore::new()),
//!     Arc::new(MemoryObjectStore::new()),
//!     Arc::new(runner),
//! );
//!
//! let request = RunRequest::new("10.0.0.1").with_parameter("alpha", "1");
//! let run = orchestrator.create_run(&upload, &experiment, request).await?;
//! println!("poll at /run/{}", run.id.short_id());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod run;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::dispatch::{ChannelRunner, EnqueueOutcome, RecordingRunner, RunMessage, Runner};
    pub use crate::error::{Error, Result};
    pub use crate::metrics::RunMetrics;
    pub use crate::orchestrator::{RunOrchestrator, RunRequest};
    pub use crate::run::{InputFile, OutputFile, ParameterValue, Run, RunPort, RunStatus};
    pub use crate::store::{memory::InMemoryRunStore, NewRun, RunStore};
}

// Re-export key types at crate root for ergonomics
pub use dispatch::{ChannelRunner, EnqueueOutcome, RecordingRunner, RunMessage, Runner};
pub use error::{Error, Result};
pub use metrics::RunMetrics;
pub use orchestrator::{RunOrchestrator, RunRequest};
pub use run::{InputFile, OutputFile, ParameterValue, Run, RunPort, RunStatus};
pub use store::{memory::InMemoryRunStore, NewRun, RunStore};
