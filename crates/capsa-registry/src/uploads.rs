//! Upload registry: one row per submission event.
//!
//! Deduplication happens at content level in the package store, never here:
//! every submission gets its own row and short-id, even when the bytes were
//! seen before. The one read-side cache is the repository key, which lets
//! repeated visits to the same external-repository location reuse the last
//! registered upload instead of fetching again.

use std::sync::Arc;

use chrono::Utc;

use capsa_core::UploadId;

use crate::error::{Error, Result};
use crate::model::{Experiment, Upload};
use crate::store::{NewUpload, RegistryStore};

/// Registry of submission events.
pub struct UploadRegistry {
    db: Arc<dyn RegistryStore>,
}

impl UploadRegistry {
    /// Creates an upload registry over the given store.
    #[must_use]
    pub fn new(db: Arc<dyn RegistryStore>) -> Self {
        Self { db }
    }

    /// Records a submission event against an experiment.
    ///
    /// Always creates a new row; the returned upload carries its assigned
    /// short-id. `repository_key` is stored verbatim when the submission
    /// came from an external repository.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the insert fails.
    pub async fn register(
        &self,
        experiment: &Experiment,
        filename: &str,
        remote_ip: &str,
        repository_key: Option<&str>,
    ) -> Result<Upload> {
        let upload = self
            .db
            .insert_upload(NewUpload {
                experiment_hash: experiment.hash.clone(),
                filename: filename.to_string(),
                submitted_ip: remote_ip.to_string(),
                repository_key: repository_key.map(str::to_string),
            })
            .await?;
        tracing::info!(
            upload = %upload.id,
            experiment = %experiment.hash,
            filename = filename,
            "registered upload"
        );
        Ok(upload)
    }

    /// Returns the most recently registered upload for a repository key.
    ///
    /// A hit refreshes last-access on the upload and its experiment - it is
    /// a cache over repeated visits, not a new submission.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    pub async fn find_by_repository_key(&self, key: &str) -> Result<Option<Upload>> {
        let Some(upload) = self.db.latest_upload_by_repository_key(key).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        self.db.touch_upload(upload.id, now).await?;
        self.db.touch_experiment(&upload.experiment_hash, now).await?;
        Ok(Some(Upload {
            last_access: now,
            ..upload
        }))
    }

    /// Looks up an upload by row id, refreshing last-access on the upload
    /// and its experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UploadNotFound`] if no row with that id exists.
    pub async fn lookup(&self, id: UploadId) -> Result<Upload> {
        let upload = self
            .db
            .get_upload(id)
            .await?
            .ok_or(Error::UploadNotFound { id })?;
        let now = Utc::now();
        self.db.touch_upload(upload.id, now).await?;
        self.db.touch_experiment(&upload.experiment_hash, now).await?;
        Ok(Upload {
            last_access: now,
            ..upload
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRegistryStore;

    async fn registry_with_experiment() -> (Arc<InMemoryRegistryStore>, UploadRegistry, Experiment)
    {
        let db = Arc::new(InMemoryRegistryStore::new());
        let experiment = Experiment::new("abc123", vec![], vec![], vec![]);
        db.insert_experiment(experiment.clone()).await.unwrap();
        let registry = UploadRegistry::new(db.clone());
        (db, registry, experiment)
    }

    #[tokio::test]
    async fn every_submission_gets_its_own_row() {
        let (db, registry, experiment) = registry_with_experiment().await;

        let first = registry
            .register(&experiment, "capsule.rpz", "10.0.0.1", None)
            .await
            .unwrap();
        let second = registry
            .register(&experiment, "capsule.rpz", "10.0.0.2", None)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_ne!(first.short_id(), second.short_id());
        assert_eq!(first.experiment_hash, second.experiment_hash);
        assert_eq!(db.upload_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn repository_key_hit_touches_instead_of_duplicating() {
        let (db, registry, experiment) = registry_with_experiment().await;

        let registered = registry
            .register(&experiment, "capsule.rpz", "10.0.0.1", Some("zenodo/123"))
            .await
            .unwrap();

        let cached = registry
            .find_by_repository_key("zenodo/123")
            .await
            .unwrap()
            .expect("key should hit");
        assert_eq!(cached.id, registered.id);
        assert!(cached.last_access >= registered.last_access);
        assert_eq!(db.upload_count().unwrap(), 1);

        assert!(registry
            .find_by_repository_key("zenodo/999")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn lookup_distinguishes_missing_rows() {
        let (_db, registry, experiment) = registry_with_experiment().await;
        let upload = registry
            .register(&experiment, "capsule.rpz", "10.0.0.1", None)
            .await
            .unwrap();

        let found = registry.lookup(upload.id).await.unwrap();
        assert_eq!(found.id, upload.id);

        let err = registry.lookup(UploadId::new(9999)).await.unwrap_err();
        assert!(matches!(err, Error::UploadNotFound { .. }));
    }
}
