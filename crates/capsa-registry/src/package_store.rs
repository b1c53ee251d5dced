//! Content-addressable package store.
//!
//! One [`Experiment`](crate::model::Experiment) exists per distinct content
//! hash. Submitting bytes that were seen before touches the existing row and
//! skips re-parsing and re-upload entirely; novel bytes are parsed, their
//! blob written, and the row inserted.
//!
//! ## Write ordering
//!
//! The blob is written before the row commits. Blob keys are content hashes,
//! so a write that loses the insert race carries identical bytes, and a
//! write whose insert fails is unreferenced garbage. A committed row
//! therefore always has its blob; the row insert is the only externally
//! reported signal.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use capsa_core::storage::{ObjectStore, EXPERIMENT_STORE};

use crate::error::{Error, Result};
use crate::metadata::MetadataExtractor;
use crate::model::Experiment;
use crate::store::RegistryStore;

/// Deduplicating store for uploaded packages.
pub struct PackageStore {
    db: Arc<dyn RegistryStore>,
    objects: Arc<dyn ObjectStore>,
    extractor: Arc<dyn MetadataExtractor>,
}

impl PackageStore {
    /// Creates a package store over the given backends.
    #[must_use]
    pub fn new(
        db: Arc<dyn RegistryStore>,
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            db,
            objects,
            extractor,
        }
    }

    /// Looks up the experiment for `hash`, creating it if the hash is novel.
    ///
    /// For a known hash this touches last-access and returns the existing
    /// row without re-parsing or re-uploading anything. For a novel hash the
    /// package is parsed (rejection persists nothing), its blob written
    /// under `experiments/{hash}`, and the row inserted. If two requests
    /// race on the same novel hash, the losing writer detects the
    /// uniqueness conflict and falls back to the winner's row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPackage`] when the extractor rejects the
    /// bytes, or a storage error from either backend.
    pub async fn store_or_get(&self, hash: &str, package: Bytes) -> Result<Experiment> {
        if let Some(experiment) = self.db.get_experiment(hash).await? {
            let now = Utc::now();
            self.db.touch_experiment(hash, now).await?;
            tracing::info!(experiment = hash, "package already stored");
            return Ok(Experiment {
                last_access: now,
                ..experiment
            });
        }

        // Might fail with InvalidPackage; nothing has been persisted yet.
        let metadata = self.extractor.parse(hash, &package).await?;

        let experiment = Experiment::new(
            hash,
            metadata.parameters,
            metadata.paths,
            metadata.extensions,
        );

        self.objects.put(EXPERIMENT_STORE, hash, package).await?;

        match self.db.insert_experiment(experiment.clone()).await {
            Ok(()) => {
                tracing::info!(experiment = hash, "inserted package in storage");
                Ok(experiment)
            }
            Err(err) if err.is_conflict() => {
                // Lost the insert race; the winner's row is authoritative.
                tracing::debug!(experiment = hash, "insert raced, reusing existing row");
                let now = Utc::now();
                self.db.touch_experiment(hash, now).await?;
                self.db.get_experiment(hash).await?.ok_or_else(|| {
                    Error::storage("experiment row vanished after conflicting insert")
                })
            }
            Err(err) => Err(err),
        }
    }
}
