//! Pluggable storage for experiment and upload rows.
//!
//! The [`RegistryStore`] trait defines the relational persistence layer for
//! the registry domain. Writers rely on two contracts:
//!
//! - **Uniqueness**: `insert_experiment` enforces one row per content hash
//!   and reports a conflict instead of overwriting, so racing writers can
//!   fall back to the lookup path.
//! - **Monotonic ids**: `insert_upload` assigns strictly increasing row ids,
//!   which the short-id codec and the "latest by repository key" query both
//!   build on.
//!
//! An in-memory implementation ships here for tests and development;
//! production backends implement the same trait.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use capsa_core::UploadId;

use crate::error::{Error, Result};
use crate::model::{Experiment, Upload};

/// Fields of an upload row before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewUpload {
    /// Content hash of the referenced experiment.
    pub experiment_hash: String,
    /// Original filename as submitted.
    pub filename: String,
    /// IP address the submission came from.
    pub submitted_ip: String,
    /// `source/path` cache key for repository-backed fetches, if any.
    pub repository_key: Option<String>,
}

/// Storage abstraction for the registry domain.
///
/// All methods are `Send + Sync` to support concurrent access from
/// independent request tasks. Readers always observe a consistent snapshot;
/// no half-written row is ever visible.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Gets an experiment by content hash.
    ///
    /// Returns `None` if no experiment with that hash exists.
    async fn get_experiment(&self, hash: &str) -> Result<Option<Experiment>>;

    /// Inserts a new experiment row.
    ///
    /// # Errors
    ///
    /// Returns a conflict (via [`capsa_core::Error::Conflict`]) if an
    /// experiment with the same hash already exists. Callers racing on a
    /// novel hash must treat that as "somebody else won" and re-read.
    async fn insert_experiment(&self, experiment: Experiment) -> Result<()>;

    /// Updates an experiment's last-access timestamp.
    async fn touch_experiment(&self, hash: &str, at: DateTime<Utc>) -> Result<()>;

    /// Inserts a new upload row, assigning the next row id.
    async fn insert_upload(&self, upload: NewUpload) -> Result<Upload>;

    /// Gets an upload by row id.
    ///
    /// Returns `None` if the upload does not exist.
    async fn get_upload(&self, id: UploadId) -> Result<Option<Upload>>;

    /// Returns the most recently created upload with the given repository
    /// key, if any.
    async fn latest_upload_by_repository_key(&self, key: &str) -> Result<Option<Upload>>;

    /// Updates an upload's last-access timestamp.
    async fn touch_upload(&self, id: UploadId, at: DateTime<Utc>) -> Result<()>;

    /// Probes store connectivity for readiness reporting.
    async fn check(&self) -> Result<()>;
}

/// Internal state protected by a single lock.
#[derive(Debug, Default)]
struct RegistryState {
    experiments: HashMap<String, Experiment>,
    uploads: BTreeMap<i64, Upload>,
    next_upload_id: i64,
}

/// In-memory registry store for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production: no durability,
/// single-process only.
#[derive(Debug, Default)]
pub struct InMemoryRegistryStore {
    state: RwLock<RegistryState>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("registry store lock poisoned")
}

impl InMemoryRegistryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of experiment rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn experiment_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.experiments.len())
    }

    /// Returns the number of upload rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn upload_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.uploads.len())
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn get_experiment(&self, hash: &str) -> Result<Option<Experiment>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.experiments.get(hash).cloned())
    }

    async fn insert_experiment(&self, experiment: Experiment) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.experiments.contains_key(&experiment.hash) {
            let hash = experiment.hash;
            drop(state);
            return Err(capsa_core::Error::conflict(format!(
                "experiment already exists for hash {hash}"
            ))
            .into());
        }
        state
            .experiments
            .insert(experiment.hash.clone(), experiment);
        drop(state);
        Ok(())
    }

    async fn touch_experiment(&self, hash: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if let Some(experiment) = state.experiments.get_mut(hash) {
            experiment.last_access = at;
        }
        drop(state);
        Ok(())
    }

    async fn insert_upload(&self, upload: NewUpload) -> Result<Upload> {
        let mut state = self.state.write().map_err(poison_err)?;
        let id = state.next_upload_id;
        state.next_upload_id += 1;

        let now = Utc::now();
        let row = Upload {
            id: UploadId::new(id),
            experiment_hash: upload.experiment_hash,
            filename: upload.filename,
            submitted_ip: upload.submitted_ip,
            repository_key: upload.repository_key,
            created_at: now,
            last_access: now,
        };
        state.uploads.insert(id, row.clone());
        drop(state);
        Ok(row)
    }

    async fn get_upload(&self, id: UploadId) -> Result<Option<Upload>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.uploads.get(&id.as_i64()).cloned())
    }

    async fn latest_upload_by_repository_key(&self, key: &str) -> Result<Option<Upload>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .uploads
            .values()
            .rev()
            .find(|u| u.repository_key.as_deref() == Some(key))
            .cloned())
    }

    async fn touch_upload(&self, id: UploadId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if let Some(upload) = state.uploads.get_mut(&id.as_i64()) {
            upload.last_access = at;
        }
        drop(state);
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        let _guard = self.state.read().map_err(poison_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_experiment(hash: &str) -> Experiment {
        Experiment::new(hash, vec![], vec![], vec![])
    }

    fn new_upload(hash: &str, key: Option<&str>) -> NewUpload {
        NewUpload {
            experiment_hash: hash.into(),
            filename: "capsule.rpz".into(),
            submitted_ip: "10.0.0.1".into(),
            repository_key: key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn duplicate_hash_conflicts() {
        let store = InMemoryRegistryStore::new();
        store
            .insert_experiment(bare_experiment("abc"))
            .await
            .expect("first insert should succeed");

        let err = store
            .insert_experiment(bare_experiment("abc"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.experiment_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn upload_ids_are_monotonic() {
        let store = InMemoryRegistryStore::new();
        let first = store.insert_upload(new_upload("abc", None)).await.unwrap();
        let second = store.insert_upload(new_upload("abc", None)).await.unwrap();
        assert!(second.id.as_i64() > first.id.as_i64());
        assert_ne!(first.short_id(), second.short_id());
    }

    #[tokio::test]
    async fn latest_by_repository_key_orders_by_creation() {
        let store = InMemoryRegistryStore::new();
        store
            .insert_upload(new_upload("abc", Some("zenodo/123")))
            .await
            .unwrap();
        store
            .insert_upload(new_upload("abc", Some("osf/456")))
            .await
            .unwrap();
        let newest = store
            .insert_upload(new_upload("def", Some("zenodo/123")))
            .await
            .unwrap();

        let found = store
            .latest_upload_by_repository_key("zenodo/123")
            .await
            .unwrap()
            .expect("key should match");
        assert_eq!(found.id, newest.id);
        assert_eq!(found.experiment_hash, "def");

        assert!(store
            .latest_upload_by_repository_key("zenodo/999")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn touch_updates_last_access_only() {
        let store = InMemoryRegistryStore::new();
        store
            .insert_experiment(bare_experiment("abc"))
            .await
            .unwrap();
        let upload = store.insert_upload(new_upload("abc", None)).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(60);
        store.touch_experiment("abc", later).await.unwrap();
        store.touch_upload(upload.id, later).await.unwrap();

        let experiment = store.get_experiment("abc").await.unwrap().unwrap();
        assert_eq!(experiment.last_access, later);
        assert!(experiment.created_at < later);

        let reread = store.get_upload(upload.id).await.unwrap().unwrap();
        assert_eq!(reread.last_access, later);
        assert_eq!(reread.created_at, upload.created_at);
    }
}
