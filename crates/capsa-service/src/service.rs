//! The service facade composing the registry and run layers.
//!
//! [`CapsaService`] is the sole mutation and query surface exposed to a
//! presentation tier. It owns the wiring: registry and run stores, object
//! storage, metadata extractor, repository resolver, and the runner queue.
//! Callers hand it short-ids and request values; everything below works in
//! internal ids.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use tracing::Instrument;

use capsa_core::observability::{registry_span, run_span};
use capsa_core::storage::{ObjectStore, OUTPUT_STORE, WEB_ARCHIVE_STORE};
use capsa_core::{content_hash, MemoryObjectStore, RunId, UploadId};
use capsa_registry::extensions::{ExtensionData, WEB_ARCHIVE_EXTENSION};
use capsa_registry::metadata::MetadataExtractor;
use capsa_registry::model::{Experiment, Upload};
use capsa_registry::package_store::PackageStore;
use capsa_registry::repository::{RepositoryFetcher, RepositoryResolver};
use capsa_registry::store::{InMemoryRegistryStore, RegistryStore};
use capsa_registry::uploads::UploadRegistry;
use capsa_run::orchestrator::{RunOrchestrator, RunRequest};
use capsa_run::run::{Run, RunStatus};
use capsa_run::store::memory::InMemoryRunStore;
use capsa_run::store::RunStore;
use capsa_run::Runner;

use crate::config::Config;
use crate::error::Result;

/// Counter: service operations by name.
pub const REQUESTS_TOTAL: &str = "capsa_service_requests_total";

fn record_operation(operation: &'static str) {
    counter!(REQUESTS_TOTAL, "operation" => operation).increment(1);
}

/// A presigned download link for one run output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLink {
    /// Declared output name.
    pub name: String,
    /// Output size in bytes.
    pub size: u64,
    /// Presigned URL serving the bytes.
    pub url: String,
}

/// A presigned link to an experiment's web-archive artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebArchiveLink {
    /// Presigned URL serving the archive.
    pub url: String,
    /// Ports to expose so the archived hosts are reachable.
    pub ports: Vec<u16>,
    /// First captured hostname, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Aggregated health status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Whether every dependency probe passed.
    pub healthy: bool,
    /// Every failing probe, not just the first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

/// The Capsa service: upload, run, poll.
pub struct CapsaService {
    config: Config,
    registry_db: Arc<dyn RegistryStore>,
    runs_db: Arc<dyn RunStore>,
    objects: Arc<dyn ObjectStore>,
    packages: Arc<PackageStore>,
    uploads: Arc<UploadRegistry>,
    fetcher: RepositoryFetcher,
    orchestrator: RunOrchestrator,
    shutting_down: AtomicBool,
}

impl CapsaService {
    /// Wires a service over the given backends.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        registry_db: Arc<dyn RegistryStore>,
        runs_db: Arc<dyn RunStore>,
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn MetadataExtractor>,
        resolver: Arc<dyn RepositoryResolver>,
        runner: Arc<dyn Runner>,
    ) -> Self {
        let packages = Arc::new(PackageStore::new(
            registry_db.clone(),
            objects.clone(),
            extractor,
        ));
        let uploads = Arc::new(UploadRegistry::new(registry_db.clone()));
        let fetcher = RepositoryFetcher::new(resolver, packages.clone(), uploads.clone());
        let orchestrator = RunOrchestrator::new(runs_db.clone(), objects.clone(), runner);
        Self {
            config,
            registry_db,
            runs_db,
            objects,
            packages,
            uploads,
            fetcher,
            orchestrator,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Wires a service over in-memory stores (for testing and development).
    #[must_use]
    pub fn with_memory_backends(
        config: Config,
        extractor: Arc<dyn MetadataExtractor>,
        resolver: Arc<dyn RepositoryResolver>,
        runner: Arc<dyn Runner>,
    ) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryRegistryStore::new()),
            Arc::new(InMemoryRunStore::new()),
            Arc::new(MemoryObjectStore::new()),
            extractor,
            resolver,
            runner,
        )
    }

    /// Returns the service configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Registers an uploaded package.
    ///
    /// Identical bytes reuse the existing experiment; the submission always
    /// gets its own upload row and short-id.
    ///
    /// # Errors
    ///
    /// Returns an invalid-package error when the bytes are rejected, or a
    /// storage error from either backend.
    pub async fn upload_package(
        &self,
        filename: &str,
        remote_ip: &str,
        contents: Bytes,
    ) -> Result<Upload> {
        record_operation("upload_package");
        let hash = content_hash(&contents);
        let span = registry_span("upload_package", &hash);
        async {
            let experiment = self.packages.store_or_get(&hash, contents).await?;
            let upload = self
                .uploads
                .register(&experiment, filename, remote_ip, None)
                .await?;
            Ok(upload)
        }
        .instrument(span)
        .await
    }

    /// Fetches a package from a URL and registers an upload for it.
    ///
    /// Repository URLs are served from the repository-key cache when the
    /// same location was fetched before.
    ///
    /// # Errors
    ///
    /// Returns a repository error (unknown host distinguished from fetch
    /// failure, messages passed through) or any registration error.
    pub async fn fetch_from_link(&self, url: &str, remote_ip: &str) -> Result<Upload> {
        record_operation("fetch_from_link");
        let upload = self.fetcher.fetch_from_link(url, remote_ip).await?;
        Ok(upload)
    }

    /// Resolves an upload short-id to the upload and its experiment.
    ///
    /// Refreshes last-access on both rows.
    ///
    /// # Errors
    ///
    /// Returns an invalid-id error for a malformed short-id, distinct from
    /// not-found for a well-formed id with no row.
    pub async fn lookup_upload(&self, short_id: &str) -> Result<(Upload, Experiment)> {
        record_operation("lookup_upload");
        let id = UploadId::from_short_id(short_id)?;
        let upload = self.uploads.lookup(id).await?;
        let experiment = self
            .registry_db
            .get_experiment(&upload.experiment_hash)
            .await?
            .ok_or_else(|| {
                capsa_core::Error::resource_not_found("experiment", &upload.experiment_hash)
            })?;
        Ok((upload, experiment))
    }

    /// Validates a run request against an upload's experiment and creates
    /// the run.
    ///
    /// Returns as soon as the run is committed; execution is handed to the
    /// runner asynchronously and polled via [`CapsaService::run_status`].
    ///
    /// # Errors
    ///
    /// Returns the validation errors of
    /// [`RunOrchestrator::create_run`], or an id/lookup error for the
    /// upload short-id.
    pub async fn create_run(&self, upload_short_id: &str, request: RunRequest) -> Result<Run> {
        record_operation("create_run");
        let (upload, experiment) = self.lookup_upload(upload_short_id).await?;
        let run = self
            .orchestrator
            .create_run(&upload, &experiment, request)
            .await?;
        Ok(run)
    }

    /// Reports a run's progress and log for polling.
    ///
    /// `log_from` (default 0) skips log content the poller already has; the
    /// log is append-only, so offsets from earlier reads stay valid.
    ///
    /// # Errors
    ///
    /// Returns an invalid-id error for a malformed short-id and not-found
    /// for a well-formed id with no row.
    pub async fn run_status(&self, short_id: &str, log_from: Option<usize>) -> Result<RunStatus> {
        record_operation("run_status");
        let id = RunId::from_short_id(short_id)?;
        let span = run_span("status", id.as_i64());
        async {
            let run = self.run(id).await?;
            Ok(run.status_report(log_from.unwrap_or(0)))
        }
        .instrument(span)
        .await
    }

    /// Resolves a run's recorded outputs to presigned download links.
    ///
    /// The MIME type is guessed from the declared path of the same name.
    ///
    /// # Errors
    ///
    /// Returns an id/lookup error for the short-id, or a storage error if
    /// an output blob is missing.
    pub async fn output_links(&self, short_id: &str) -> Result<Vec<OutputLink>> {
        record_operation("output_links");
        let id = RunId::from_short_id(short_id)?;
        let run = self.run(id).await?;
        let experiment = self
            .registry_db
            .get_experiment(&run.experiment_hash)
            .await?
            .ok_or_else(|| {
                capsa_core::Error::resource_not_found("experiment", &run.experiment_hash)
            })?;

        let mut links = Vec::with_capacity(run.output_files.len());
        for output in &run.output_files {
            let declared = experiment.path(&output.name);
            let display_name = declared
                .and_then(|p| Path::new(&p.path).file_name())
                .map_or_else(|| output.name.clone(), |n| n.to_string_lossy().into_owned());
            let mime = declared.map_or("application/octet-stream", |p| guess_mime(&p.path));
            let url = self
                .objects
                .presigned_serve_url(OUTPUT_STORE, &output.hash, &display_name, mime)
                .await?;
            links.push(OutputLink {
                name: output.name.clone(),
                size: output.size,
                url,
            });
        }
        Ok(links)
    }

    /// Resolves an experiment's web-archive extension, if it carries one.
    ///
    /// Returns the presigned archive URL plus the ports to expose for the
    /// archived hosts. `None` when the experiment has no readable `web1`
    /// extension.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the archive artifact is missing.
    pub async fn web_archive(&self, experiment: &Experiment) -> Result<Option<WebArchiveLink>> {
        record_operation("web_archive");
        let Some(extension) = experiment.extension(WEB_ARCHIVE_EXTENSION) else {
            return Ok(None);
        };
        let ExtensionData::WebArchive(archive) = extension.decode() else {
            return Ok(None);
        };

        let key = archive.archive_key();
        let url = self
            .objects
            .presigned_serve_url(WEB_ARCHIVE_STORE, &key, &key, "application/zip")
            .await?;
        Ok(Some(WebArchiveLink {
            url,
            ports: archive.ports().into_iter().collect(),
            hostname: archive.primary_hostname().map(str::to_string),
        }))
    }

    /// Builds the proxy URL for an exposed run port.
    ///
    /// Returns `None` when no web proxy is configured.
    #[must_use]
    pub fn interactive_link(&self, run: &Run, port: u16) -> Option<String> {
        let proxy = self.config.web_proxy_url.as_deref()?;
        Some(format!("https://{}-{port}.{proxy}/", run.id.short_id()))
    }

    /// Probes every dependency and reports all failures.
    ///
    /// Once [`CapsaService::begin_shutdown`] has been called this fails
    /// immediately, before any dependency check, so load balancers stop
    /// routing new work promptly.
    pub async fn health(&self) -> HealthReport {
        record_operation("health");
        if self.shutting_down.load(Ordering::SeqCst) {
            return HealthReport {
                healthy: false,
                failures: vec!["Shutting down".to_string()],
            };
        }

        let mut failures = Vec::new();
        if let Err(err) = self.objects.check().await {
            failures.push(format!("object storage: {err}"));
        }
        if let Err(err) = self.registry_db.check().await {
            failures.push(format!("registry store: {err}"));
        }
        if let Err(err) = self.runs_db.check().await {
            failures.push(format!("run store: {err}"));
        }
        HealthReport {
            healthy: failures.is_empty(),
            failures,
        }
    }

    /// Marks the service as shutting down.
    ///
    /// Irreversible; health reporting fails from this point on.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        tracing::info!("service shutting down, health now reports failure");
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    async fn run(&self, id: RunId) -> Result<Run> {
        let run = self
            .runs_db
            .get_run(id)
            .await?
            .ok_or(capsa_run::Error::RunNotFound { run_id: id })?;
        Ok(run)
    }
}

/// Guesses a download MIME type from a declared path.
fn guess_mime(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => "text/csv",
        Some("txt" | "log") => "text/plain",
        Some("json") => "application/json",
        Some("html") => "text/html",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use capsa_registry::metadata::{PackageMetadata, StubMetadataExtractor};
    use capsa_registry::repository::StaticRepositoryResolver;
    use capsa_run::dispatch::RecordingRunner;

    fn service_with(extractor: StubMetadataExtractor) -> CapsaService {
        CapsaService::with_memory_backends(
            Config::default(),
            Arc::new(extractor),
            Arc::new(StaticRepositoryResolver::new()),
            Arc::new(RecordingRunner::new()),
        )
    }

    fn empty_metadata_service() -> CapsaService {
        service_with(StubMetadataExtractor::accepting(PackageMetadata::default()))
    }

    #[test]
    fn mime_guessing_covers_declared_outputs() {
        assert_eq!(guess_mime("out/results.csv"), "text/csv");
        assert_eq!(guess_mime("out/trace.LOG"), "text/plain");
        assert_eq!(guess_mime("out/model.bin"), "application/octet-stream");
        assert_eq!(guess_mime("noextension"), "application/octet-stream");
    }

    #[tokio::test]
    async fn lookup_rejects_malformed_short_ids() {
        let service = empty_metadata_service();
        let err = service.lookup_upload("not-a-short-id").await.unwrap_err();
        assert!(err.is_invalid_id());
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn lookup_distinguishes_missing_rows() {
        let service = empty_metadata_service();
        let well_formed = UploadId::new(9999).short_id();
        let err = service.lookup_upload(&well_formed).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_invalid_id());
    }

    #[tokio::test]
    async fn run_status_rejects_upload_short_ids() {
        let service = empty_metadata_service();
        // An Upload short-id must not decode in the Run namespace.
        let upload_short = UploadId::new(1).short_id();
        let err = service.run_status(&upload_short, None).await.unwrap_err();
        assert!(err.is_invalid_id());
    }

    #[tokio::test]
    async fn shutdown_flag_short_circuits_health() {
        let service = empty_metadata_service();
        assert!(service.health().await.healthy);

        service.begin_shutdown();
        let report = service.health().await;
        assert!(!report.healthy);
        assert_eq!(report.failures, vec!["Shutting down".to_string()]);
        assert!(service.is_shutting_down());
    }

    #[tokio::test]
    async fn health_reports_every_failing_probe() {
        let objects = Arc::new(MemoryObjectStore::new());
        let service = CapsaService::new(
            Config::default(),
            Arc::new(InMemoryRegistryStore::new()),
            Arc::new(InMemoryRunStore::new()),
            objects.clone(),
            Arc::new(StubMetadataExtractor::accepting(PackageMetadata::default())),
            Arc::new(StaticRepositoryResolver::new()),
            Arc::new(RecordingRunner::new()),
        );

        objects.set_check_failure(Some("bucket unreachable"));
        let report = service.health().await;
        assert!(!report.healthy);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("bucket unreachable"));
    }

    #[tokio::test]
    async fn interactive_links_require_a_proxy() {
        let mut config = Config::default();
        let service = service_with(StubMetadataExtractor::accepting(PackageMetadata::default()));
        let upload = service
            .upload_package("capsule.rpz", "10.0.0.1", Bytes::from("pkg"))
            .await
            .unwrap();
        let run = service
            .create_run(&upload.short_id(), RunRequest::new("10.0.0.1"))
            .await
            .unwrap();
        assert!(service.interactive_link(&run, 8080).is_none());

        config.web_proxy_url = Some("web.capsa.example.org".to_string());
        let service = CapsaService::with_memory_backends(
            config,
            Arc::new(StubMetadataExtractor::accepting(PackageMetadata::default())),
            Arc::new(StaticRepositoryResolver::new()),
            Arc::new(RecordingRunner::new()),
        );
        let link = service.interactive_link(&run, 8080).unwrap();
        assert_eq!(
            link,
            format!("https://{}-8080.web.capsa.example.org/", run.id.short_id())
        );
    }
}
