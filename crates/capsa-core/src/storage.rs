//! Object storage abstraction for package and run artifacts (S3, GCS, local).
//!
//! This module defines the blob-store contract the rest of Capsa programs
//! against. Objects live in named stores and are keyed by content hash, so
//! writes are idempotent: re-uploading the same bytes under the same key is
//! harmless. That property is what lets callers write blobs before the
//! owning database row commits - a failed commit leaves garbage, never a
//! dangling row.
//!
//! The durable backend (an S3-like service) is an external collaborator;
//! only [`MemoryObjectStore`] ships here, for tests and development.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{Error, Result};

/// Store for uploaded package bytes, keyed by package content hash.
pub const EXPERIMENT_STORE: &str = "experiments";

/// Store for per-run input file bytes, keyed by input content hash.
pub const INPUT_STORE: &str = "inputs";

/// Store for run output bytes, keyed by output content hash.
pub const OUTPUT_STORE: &str = "outputs";

/// Store for web-archive artifacts, keyed by their own hash.
pub const WEB_ARCHIVE_STORE: &str = "web1";

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// The store the object lives in.
    pub store: String,
    /// Object key within the store.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Blob storage contract for all Capsa artifacts.
///
/// Implementations target S3-compatible object storage in production and
/// memory in tests. All methods are `Send + Sync` for concurrent access
/// from independent request tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Writes an object. Overwrites silently; keys are content hashes, so
    /// an overwrite always carries identical bytes.
    async fn put(&self, store: &str, key: &str, data: Bytes) -> Result<()>;

    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object does not exist.
    async fn get(&self, store: &str, key: &str) -> Result<Bytes>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if the object does not exist.
    async fn head(&self, store: &str, key: &str) -> Result<Option<ObjectMeta>>;

    /// Generates a presigned URL serving the object under a download name
    /// and MIME type of the caller's choosing.
    async fn presigned_serve_url(
        &self,
        store: &str,
        key: &str,
        display_name: &str,
        mime_type: &str,
    ) -> Result<String>;

    /// Probes backend connectivity.
    ///
    /// Used by readiness reporting; a cheap metadata call is enough to
    /// validate credentials and the network path.
    async fn check(&self) -> Result<()>;
}

/// In-memory object store for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
    check_failure: RwLock<Option<String>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("object store lock poisoned")
}

impl MemoryObjectStore {
    /// Creates a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent [`ObjectStore::check`] calls fail with the given
    /// message, or succeed again when `None`. Test hook for health probes.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set_check_failure(&self, message: Option<&str>) {
        *self
            .check_failure
            .write()
            .expect("check_failure lock poisoned") = message.map(str::to_string);
    }

    /// Returns the number of objects in the given store.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn object_count(&self, store: &str) -> Result<usize> {
        let objects = self.objects.read().map_err(poison_err)?;
        Ok(objects.keys().filter(|(s, _)| s == store).count())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, store: &str, key: &str, data: Bytes) -> Result<()> {
        let mut objects = self.objects.write().map_err(poison_err)?;
        objects.insert(
            (store.to_string(), key.to_string()),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, store: &str, key: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(poison_err)?;
        objects
            .get(&(store.to_string(), key.to_string()))
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {store}/{key}")))
    }

    async fn head(&self, store: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(poison_err)?;
        Ok(objects
            .get(&(store.to_string(), key.to_string()))
            .map(|obj| ObjectMeta {
                store: store.to_string(),
                key: key.to_string(),
                size: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            }))
    }

    async fn presigned_serve_url(
        &self,
        store: &str,
        key: &str,
        display_name: &str,
        mime_type: &str,
    ) -> Result<String> {
        let objects = self.objects.read().map_err(poison_err)?;
        if !objects.contains_key(&(store.to_string(), key.to_string())) {
            return Err(Error::NotFound(format!("object not found: {store}/{key}")));
        }
        drop(objects);

        // Mock URL for testing; a real backend signs these.
        Ok(format!(
            "memory://localhost/{store}/{key}?filename={display_name}&type={mime_type}&signature=mock"
        ))
    }

    async fn check(&self) -> Result<()> {
        let failure = self.check_failure.read().map_err(poison_err)?;
        match failure.as_deref() {
            Some(message) => Err(Error::storage(message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryObjectStore::new();
        let data = Bytes::from("package bytes");

        store
            .put(EXPERIMENT_STORE, "abc123", data.clone())
            .await
            .expect("put should succeed");

        let retrieved = store
            .get(EXPERIMENT_STORE, "abc123")
            .await
            .expect("get should succeed");
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn stores_are_isolated() {
        let store = MemoryObjectStore::new();
        store
            .put(EXPERIMENT_STORE, "k", Bytes::from("a"))
            .await
            .unwrap();

        let err = store.get(INPUT_STORE, "k").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(store.object_count(EXPERIMENT_STORE).unwrap(), 1);
        assert_eq!(store.object_count(INPUT_STORE).unwrap(), 0);
    }

    #[tokio::test]
    async fn head_reports_size() {
        let store = MemoryObjectStore::new();
        store
            .put(INPUT_STORE, "deadbeef", Bytes::from("12345"))
            .await
            .unwrap();

        let meta = store
            .head(INPUT_STORE, "deadbeef")
            .await
            .expect("head should succeed")
            .expect("object should exist");
        assert_eq!(meta.size, 5);
        assert!(meta.last_modified.is_some());

        assert!(store.head(INPUT_STORE, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_is_idempotent() {
        let store = MemoryObjectStore::new();
        let data = Bytes::from("same content");
        store.put(OUTPUT_STORE, "h", data.clone()).await.unwrap();
        store.put(OUTPUT_STORE, "h", data.clone()).await.unwrap();

        assert_eq!(store.object_count(OUTPUT_STORE).unwrap(), 1);
        assert_eq!(store.get(OUTPUT_STORE, "h").await.unwrap(), data);
    }

    #[tokio::test]
    async fn presigned_url_carries_display_name_and_type() {
        let store = MemoryObjectStore::new();
        store
            .put(OUTPUT_STORE, "cafe", Bytes::from("out"))
            .await
            .unwrap();

        let url = store
            .presigned_serve_url(OUTPUT_STORE, "cafe", "results.csv", "text/csv")
            .await
            .expect("presigned_serve_url should succeed");
        assert!(url.contains("cafe"));
        assert!(url.contains("results.csv"));
        assert!(url.contains("text/csv"));

        let err = store
            .presigned_serve_url(OUTPUT_STORE, "missing", "x", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn check_honours_injected_failure() {
        let store = MemoryObjectStore::new();
        assert!(store.check().await.is_ok());

        store.set_check_failure(Some("bucket unreachable"));
        let err = store.check().await.unwrap_err();
        assert!(err.to_string().contains("bucket unreachable"));

        store.set_check_failure(None);
        assert!(store.check().await.is_ok());
    }
}
