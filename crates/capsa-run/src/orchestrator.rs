//! Validated, atomic run creation and handoff to the runner.
//!
//! [`RunOrchestrator::create_run`] is the single mutation path for runs.
//! Every check runs before anything is persisted, the run and all of its
//! children commit together, and the handoff to the external runner happens
//! after commit on a task the caller never awaits. A failure after that
//! point is written into the run's own log for pollers to find; the caller
//! has already received its response.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use capsa_core::storage::{ObjectStore, INPUT_STORE};
use capsa_core::{content_hash, RunId};
use capsa_registry::model::{Experiment, Upload};

use crate::dispatch::Runner;
use crate::error::{Error, Result};
use crate::metrics::RunMetrics;
use crate::run::{InputFile, ParameterValue, Run, RunPort};
use crate::store::{NewRun, RunStore};

/// One run request, as an immutable value object.
///
/// Carries everything the orchestrator needs; nothing here assumes a
/// framework-managed request lifecycle.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// IP address the request came from.
    pub remote_ip: String,
    /// Submitted parameter values by declared name.
    pub parameters: BTreeMap<String, String>,
    /// Submitted input files by declared name.
    pub inputs: BTreeMap<String, Bytes>,
    /// Whitespace-separated port tokens to expose.
    pub ports: String,
}

impl RunRequest {
    /// Creates an empty request from the given address.
    #[must_use]
    pub fn new(remote_ip: impl Into<String>) -> Self {
        Self {
            remote_ip: remote_ip.into(),
            ..Self::default()
        }
    }

    /// Adds a parameter value.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Adds an input file.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        self.inputs.insert(name.into(), contents.into());
        self
    }

    /// Sets the requested ports as a whitespace-separated token string.
    #[must_use]
    pub fn with_ports(mut self, ports: impl Into<String>) -> Self {
        self.ports = ports.into();
        self
    }
}

/// Orchestrates run creation and runner handoff.
pub struct RunOrchestrator {
    runs: Arc<dyn RunStore>,
    objects: Arc<dyn ObjectStore>,
    runner: Arc<dyn Runner>,
    metrics: RunMetrics,
}

impl RunOrchestrator {
    /// Creates an orchestrator over the given backends.
    #[must_use]
    pub fn new(
        runs: Arc<dyn RunStore>,
        objects: Arc<dyn ObjectStore>,
        runner: Arc<dyn Runner>,
    ) -> Self {
        Self {
            runs,
            objects,
            runner,
            metrics: RunMetrics::new(),
        }
    }

    /// Validates a run request and creates the run.
    ///
    /// Validation order: unknown parameters, then all missing mandatory
    /// parameters at once, then unknown input files, then input staging,
    /// then port tokens (first invalid token reported). Only when everything
    /// passes are the run and its children persisted, in one commit. The
    /// runner enqueue is issued after commit and never awaited here; a
    /// failure there is recorded into the run's log and progress state.
    ///
    /// # Errors
    ///
    /// Returns the client input errors above, or a storage error from either
    /// backend. On any error nothing is persisted (input blobs staged before
    /// a later failure are unreferenced garbage, never a visible row).
    pub async fn create_run(
        &self,
        upload: &Upload,
        experiment: &Experiment,
        request: RunRequest,
    ) -> Result<Run> {
        let started = Instant::now();

        let staged = match self.validate(experiment, request).await {
            Ok(staged) => staged,
            Err(err) => {
                if err.is_client_error() {
                    self.metrics.record_validation_failure(failure_kind(&err));
                    tracing::info!(
                        experiment = %experiment.hash,
                        error = %err,
                        "rejected run request"
                    );
                }
                return Err(err);
            }
        };

        let run = self
            .runs
            .insert_run(NewRun {
                experiment_hash: experiment.hash.clone(),
                upload_id: upload.id,
                submitted_ip: staged.remote_ip,
                parameter_values: staged.parameter_values,
                input_files: staged.input_files,
                ports: staged.ports,
            })
            .await?;

        self.metrics.record_run_created();
        self.metrics.observe_create_duration(started.elapsed());
        tracing::info!(
            run = %run.id,
            experiment = %experiment.hash,
            upload = %upload.id,
            "created run"
        );

        self.spawn_dispatch(run.id);
        Ok(run)
    }

    async fn validate(&self, experiment: &Experiment, request: RunRequest) -> Result<StagedRun> {
        let declared = experiment.parameter_names();
        let mandatory = experiment.mandatory_parameter_names();

        let mut parameter_values = Vec::with_capacity(request.parameters.len());
        for (name, value) in request.parameters {
            if !declared.contains(name.as_str()) {
                return Err(Error::UnknownParameter { name });
            }
            parameter_values.push(ParameterValue { name, value });
        }

        let missing: Vec<String> = mandatory
            .iter()
            .filter(|name| !parameter_values.iter().any(|p| p.name == **name))
            .map(|name| (*name).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingParameters { names: missing });
        }

        let input_names = experiment.input_names();
        for name in request.inputs.keys() {
            if !input_names.contains(name.as_str()) {
                return Err(Error::UnknownInputFile { name: name.clone() });
            }
        }

        let mut input_files = Vec::with_capacity(request.inputs.len());
        for (name, contents) in request.inputs {
            let hash = content_hash(&contents);
            let size = contents.len() as u64;
            // The key dedups in storage; the row is always per-run.
            self.objects.put(INPUT_STORE, &hash, contents).await?;
            self.metrics.record_input_bytes(size);
            input_files.push(InputFile { hash, name, size });
        }

        let mut ports = Vec::new();
        for token in request.ports.split_whitespace() {
            let port_number = token
                .parse::<u16>()
                .ok()
                .filter(|port| *port >= 1)
                .ok_or_else(|| Error::InvalidPort {
                    token: token.to_string(),
                })?;
            ports.push(RunPort { port_number });
        }

        Ok(StagedRun {
            remote_ip: request.remote_ip,
            parameter_values,
            input_files,
            ports,
        })
    }

    /// Hands the committed run to the runner without awaiting the outcome.
    fn spawn_dispatch(&self, run_id: RunId) {
        let runs = Arc::clone(&self.runs);
        let runner = Arc::clone(&self.runner);
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            match runner.enqueue(run_id).await {
                Ok(outcome) => {
                    metrics.record_dispatch(if outcome.is_enqueued() {
                        "enqueued"
                    } else {
                        "deduplicated"
                    });
                    tracing::debug!(run = %run_id, "run handed to runner");
                }
                Err(err) => {
                    metrics.record_dispatch("failed");
                    tracing::error!(run = %run_id, error = %err, "runner enqueue failed");
                    // The caller already has its response; the failure is
                    // only observable through the run's own state.
                    if let Err(store_err) = record_dispatch_failure(&*runs, run_id, &err).await {
                        tracing::error!(
                            run = %run_id,
                            error = %store_err,
                            "failed to record enqueue failure on run"
                        );
                    }
                }
            }
        });
    }
}

/// Validated request fields ready to persist.
struct StagedRun {
    remote_ip: String,
    parameter_values: Vec<ParameterValue>,
    input_files: Vec<InputFile>,
    ports: Vec<RunPort>,
}

async fn record_dispatch_failure(
    runs: &dyn RunStore,
    run_id: RunId,
    err: &Error,
) -> Result<()> {
    let text = format!("Failed to queue execution: {err}");
    runs.append_log(run_id, &format!("{text}\n")).await?;
    runs.set_progress(run_id, 0, &text).await?;
    runs.mark_done(run_id).await
}

fn failure_kind(err: &Error) -> &'static str {
    match err {
        Error::UnknownParameter { .. } => "unknown_parameter",
        Error::MissingParameters { .. } => "missing_parameter",
        Error::UnknownInputFile { .. } => "unknown_input_file",
        Error::InvalidPort { .. } => "invalid_port",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use capsa_core::storage::MemoryObjectStore;
    use capsa_core::UploadId;
    use capsa_registry::model::{ParameterSpec, PathSpec};
    use chrono::Utc;

    use crate::dispatch::RecordingRunner;
    use crate::store::memory::InMemoryRunStore;

    fn experiment() -> Experiment {
        Experiment::new(
            "exp-hash",
            vec![
                ParameterSpec {
                    name: "alpha".into(),
                    optional: false,
                    default: None,
                },
                ParameterSpec {
                    name: "beta".into(),
                    optional: true,
                    default: Some("0.5".into()),
                },
            ],
            vec![
                PathSpec {
                    name: "training_data".into(),
                    path: "data/train.csv".into(),
                    is_input: true,
                    is_output: false,
                },
                PathSpec {
                    name: "model".into(),
                    path: "out/model.bin".into(),
                    is_input: false,
                    is_output: true,
                },
            ],
            vec![],
        )
    }

    fn upload() -> Upload {
        Upload {
            id: UploadId::new(1),
            experiment_hash: "exp-hash".into(),
            filename: "capsule.rpz".into(),
            submitted_ip: "10.0.0.1".into(),
            repository_key: None,
            created_at: Utc::now(),
            last_access: Utc::now(),
        }
    }

    struct Fixture {
        runs: Arc<InMemoryRunStore>,
        objects: Arc<MemoryObjectStore>,
        runner: Arc<RecordingRunner>,
        orchestrator: RunOrchestrator,
    }

    fn fixture() -> Fixture {
        let runs = Arc::new(InMemoryRunStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let runner = Arc::new(RecordingRunner::new());
        let orchestrator =
            RunOrchestrator::new(runs.clone(), objects.clone(), runner.clone());
        Fixture {
            runs,
            objects,
            runner,
            orchestrator,
        }
    }

    /// Polls until the spawned dispatch task has run.
    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn valid_request_creates_and_enqueues() {
        let f = fixture();
        let request = RunRequest::new("10.0.0.2")
            .with_parameter("alpha", "1")
            .with_ports("80 443");

        let run = f
            .orchestrator
            .create_run(&upload(), &experiment(), request)
            .await
            .unwrap();

        assert_eq!(run.experiment_hash, "exp-hash");
        assert_eq!(run.submitted_ip, "10.0.0.2");
        assert!(!run.started);
        assert_eq!(
            run.ports,
            vec![RunPort { port_number: 80 }, RunPort { port_number: 443 }]
        );
        assert_eq!(run.parameter_values.len(), 1);

        let runner = f.runner.clone();
        wait_for(move || runner.enqueued().contains(&run.id)).await;
    }

    #[tokio::test]
    async fn unknown_parameter_is_rejected() {
        let f = fixture();
        let request = RunRequest::new("10.0.0.2")
            .with_parameter("alpha", "1")
            .with_parameter("gamma", "2");

        let err = f
            .orchestrator
            .create_run(&upload(), &experiment(), request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownParameter { ref name } if name == "gamma"));
        assert_eq!(f.runs.run_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_mandatory_parameters_are_all_named() {
        let f = fixture();
        // Only the optional parameter: the mandatory one is missing.
        let request = RunRequest::new("10.0.0.2").with_parameter("beta", "0.9");

        let err = f
            .orchestrator
            .create_run(&upload(), &experiment(), request)
            .await
            .unwrap_err();
        let Error::MissingParameters { names } = err else {
            panic!("expected MissingParameters, got {err:?}");
        };
        assert_eq!(names, vec!["alpha".to_string()]);
        assert_eq!(f.runs.run_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn supplying_only_mandatory_parameters_succeeds() {
        let f = fixture();
        let request = RunRequest::new("10.0.0.2").with_parameter("alpha", "1");
        assert!(f
            .orchestrator
            .create_run(&upload(), &experiment(), request)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_input_file_is_rejected() {
        let f = fixture();
        let request = RunRequest::new("10.0.0.2")
            .with_parameter("alpha", "1")
            .with_input("bogus", "bytes");

        let err = f
            .orchestrator
            .create_run(&upload(), &experiment(), request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownInputFile { ref name } if name == "bogus"));
        // Nothing staged: the name check runs before any blob write.
        assert_eq!(f.objects.object_count(INPUT_STORE).unwrap(), 0);
    }

    #[tokio::test]
    async fn inputs_are_staged_content_addressed() {
        let f = fixture();
        let contents = Bytes::from("col_a,col_b\n1,2\n");
        let request = RunRequest::new("10.0.0.2")
            .with_parameter("alpha", "1")
            .with_input("training_data", contents.clone());

        let run = f
            .orchestrator
            .create_run(&upload(), &experiment(), request)
            .await
            .unwrap();

        assert_eq!(run.input_files.len(), 1);
        let input = &run.input_files[0];
        assert_eq!(input.name, "training_data");
        assert_eq!(input.hash, content_hash(&contents));
        assert_eq!(input.size, contents.len() as u64);
        assert_eq!(
            f.objects.get(INPUT_STORE, &input.hash).await.unwrap(),
            contents
        );
    }

    #[tokio::test]
    async fn first_invalid_port_token_is_cited() {
        let f = fixture();
        let request = RunRequest::new("10.0.0.2")
            .with_parameter("alpha", "1")
            .with_ports("80 99999");

        let err = f
            .orchestrator
            .create_run(&upload(), &experiment(), request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPort { ref token } if token == "99999"));
        assert_eq!(f.runs.run_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn port_zero_is_rejected() {
        let f = fixture();
        let request = RunRequest::new("10.0.0.2")
            .with_parameter("alpha", "1")
            .with_ports("0");

        let err = f
            .orchestrator
            .create_run(&upload(), &experiment(), request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPort { ref token } if token == "0"));
    }

    #[tokio::test]
    async fn enqueue_failure_lands_in_the_run_log() {
        let f = fixture();
        f.runner.set_failure(Some("runner queue full"));

        let request = RunRequest::new("10.0.0.2").with_parameter("alpha", "1");
        // The caller still gets its run back; the failure is asynchronous.
        let run = f
            .orchestrator
            .create_run(&upload(), &experiment(), request)
            .await
            .unwrap();

        let mut failed = None;
        for _ in 0..100 {
            let snapshot = f.runs.get_run(run.id).await.unwrap().unwrap();
            if snapshot.done {
                failed = Some(snapshot);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let failed = failed.expect("dispatch failure should be recorded");
        assert!(failed.log.contains("runner queue full"));
        assert!(failed.progress_text.contains("Failed to queue execution"));
        // A failed handoff still polls as done; the log tells the story.
        assert_eq!(failed.status().0, 100);
    }
}
