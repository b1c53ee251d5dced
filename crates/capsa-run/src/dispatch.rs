//! Runner dispatch abstraction.
//!
//! Handing a committed run to the external execution engine is a
//! fire-and-forget enqueue: the orchestrator issues it after commit and never
//! awaits its outcome on the response path. This module provides:
//!
//! - [`Runner`]: the enqueue seam, assumed idempotent per run id
//! - [`ChannelRunner`]: a bounded in-process queue owned by the core
//! - [`RecordingRunner`]: a test double that records enqueued run ids
//!
//! A build backlog or runner outage must never stall request handling, so
//! the channel-backed queue refuses immediately when full instead of
//! blocking the enqueueing task.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use ulid::Ulid;

use capsa_core::RunId;

use crate::error::{Error, Result};

/// Outcome of enqueueing a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The run was enqueued.
    Enqueued {
        /// Queue-specific message id.
        message_id: String,
    },
    /// The run was already enqueued; the earlier message stands.
    Deduplicated {
        /// Message id of the earlier enqueue.
        existing_message_id: String,
    },
}

impl EnqueueOutcome {
    /// Returns true if this enqueue placed a new message on the queue.
    #[must_use]
    pub const fn is_enqueued(&self) -> bool {
        matches!(self, Self::Enqueued { .. })
    }

    /// Returns the message id associated with the run.
    #[must_use]
    pub fn message_id(&self) -> &str {
        match self {
            Self::Enqueued { message_id }
            | Self::Deduplicated {
                existing_message_id: message_id,
            } => message_id,
        }
    }
}

/// Enqueue seam to the external execution engine.
///
/// Implementations must be idempotent per run id: enqueueing the same run
/// twice hands it to the engine once.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Enqueues a run for execution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatch`] when the run cannot be handed off (queue
    /// full, backend unreachable). The orchestrator records such failures
    /// into the run's own log; they are never raised to the original caller.
    async fn enqueue(&self, run_id: RunId) -> Result<EnqueueOutcome>;
}

/// A message on the run queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMessage {
    /// Queue message id.
    pub message_id: String,
    /// The run to execute.
    pub run_id: RunId,
}

/// Bounded in-process run queue.
///
/// The queue is owned by the core, independent of any particular execution
/// backend: a worker loop consumes the receiving half. Enqueueing never
/// blocks; a full queue is reported as a dispatch error instead.
#[derive(Debug)]
pub struct ChannelRunner {
    sender: mpsc::Sender<RunMessage>,
    seen: Mutex<HashMap<i64, String>>,
}

impl ChannelRunner {
    /// Creates a queue with the given capacity, returning the runner and the
    /// receiving half for the worker loop.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<RunMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                sender,
                seen: Mutex::new(HashMap::new()),
            },
            receiver,
        )
    }
}

/// Converts a lock poison error to a dispatch error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::dispatch("runner queue lock poisoned")
}

#[async_trait]
impl Runner for ChannelRunner {
    async fn enqueue(&self, run_id: RunId) -> Result<EnqueueOutcome> {
        let mut seen = self.seen.lock().map_err(poison_err)?;
        if let Some(existing) = seen.get(&run_id.as_i64()) {
            return Ok(EnqueueOutcome::Deduplicated {
                existing_message_id: existing.clone(),
            });
        }

        let message_id = Ulid::new().to_string();
        self.sender
            .try_send(RunMessage {
                message_id: message_id.clone(),
                run_id,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => Error::dispatch("runner queue full"),
                mpsc::error::TrySendError::Closed(_) => Error::dispatch("runner queue closed"),
            })?;

        seen.insert(run_id.as_i64(), message_id.clone());
        drop(seen);
        Ok(EnqueueOutcome::Enqueued { message_id })
    }
}

/// Runner test double recording every enqueued run id.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    enqueued: RwLock<Vec<RunId>>,
    failure: RwLock<Option<String>>,
}

impl RecordingRunner {
    /// Creates a runner that accepts every enqueue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent enqueues fail with the given message, or succeed
    /// again when `None`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.write().expect("failure lock poisoned") = message.map(str::to_string);
    }

    /// Returns every run id enqueued so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn enqueued(&self) -> Vec<RunId> {
        self.enqueued.read().expect("enqueued lock poisoned").clone()
    }
}

#[async_trait]
impl Runner for RecordingRunner {
    async fn enqueue(&self, run_id: RunId) -> Result<EnqueueOutcome> {
        if let Some(message) = self
            .failure
            .read()
            .map_err(|_| Error::dispatch("failure lock poisoned"))?
            .as_deref()
        {
            return Err(Error::dispatch(message));
        }
        self.enqueued
            .write()
            .map_err(|_| Error::dispatch("enqueued lock poisoned"))?
            .push(run_id);
        Ok(EnqueueOutcome::Enqueued {
            message_id: Ulid::new().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_runner_delivers_messages() {
        let (runner, mut receiver) = ChannelRunner::bounded(4);

        let outcome = runner.enqueue(RunId::new(1)).await.unwrap();
        assert!(outcome.is_enqueued());

        let message = receiver.recv().await.expect("message should arrive");
        assert_eq!(message.run_id, RunId::new(1));
        assert_eq!(message.message_id, outcome.message_id());
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_per_run() {
        let (runner, mut receiver) = ChannelRunner::bounded(4);

        let first = runner.enqueue(RunId::new(7)).await.unwrap();
        let second = runner.enqueue(RunId::new(7)).await.unwrap();

        assert!(first.is_enqueued());
        assert!(!second.is_enqueued());
        assert_eq!(second.message_id(), first.message_id());

        // Exactly one message reached the queue.
        assert!(receiver.recv().await.is_some());
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_reports_dispatch_error() {
        let (runner, _receiver) = ChannelRunner::bounded(1);

        runner.enqueue(RunId::new(1)).await.unwrap();
        let err = runner.enqueue(RunId::new(2)).await.unwrap_err();
        assert!(matches!(err, Error::Dispatch { .. }));
        assert!(err.to_string().contains("full"));
    }

    #[tokio::test]
    async fn closed_queue_reports_dispatch_error() {
        let (runner, receiver) = ChannelRunner::bounded(1);
        drop(receiver);

        let err = runner.enqueue(RunId::new(1)).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn recording_runner_records_in_order() {
        let runner = RecordingRunner::new();
        runner.enqueue(RunId::new(3)).await.unwrap();
        runner.enqueue(RunId::new(5)).await.unwrap();
        assert_eq!(runner.enqueued(), vec![RunId::new(3), RunId::new(5)]);
    }

    #[tokio::test]
    async fn recording_runner_honours_injected_failure() {
        let runner = RecordingRunner::new();
        runner.set_failure(Some("backend unreachable"));

        let err = runner.enqueue(RunId::new(1)).await.unwrap_err();
        assert!(err.to_string().contains("backend unreachable"));
        assert!(runner.enqueued().is_empty());

        runner.set_failure(None);
        assert!(runner.enqueue(RunId::new(1)).await.is_ok());
    }
}
