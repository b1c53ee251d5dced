//! External data-repository resolution and cached fetch.
//!
//! Resolving a URL to a hosting repository and downloading the package are
//! external collaborators behind [`RepositoryResolver`]. What lives here is
//! the orchestration around them: repeated visits to the same repository
//! location are served from the upload registry's repository-key cache, and
//! only a miss actually downloads, stores, and registers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use capsa_core::content_hash;

use crate::error::{Error, Result};
use crate::model::Upload;
use crate::package_store::PackageStore;
use crate::uploads::UploadRegistry;

/// A parsed repository location: which repository, and the path within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    /// Repository identifier (e.g. `zenodo`).
    pub repository: String,
    /// Path of the package within the repository.
    pub path: String,
}

impl RepositoryLocation {
    /// Creates a location.
    #[must_use]
    pub fn new(repository: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            path: path.into(),
        }
    }

    /// Returns the `source/path` cache key stored on uploads.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.repository, self.path)
    }
}

/// A package downloaded from a repository or direct link.
#[derive(Debug, Clone)]
pub struct FetchedPackage {
    /// Filename to record on the upload.
    pub filename: String,
    /// Package bytes.
    pub contents: Bytes,
}

/// Resolves and downloads packages from external data repositories.
#[async_trait]
pub trait RepositoryResolver: Send + Sync {
    /// Parses a URL into a repository location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RepositoryUnknown`] when no known repository serves
    /// the URL, or [`Error::Repository`] when a known repository rejects it.
    async fn parse_url(&self, url: &str) -> Result<RepositoryLocation>;

    /// Downloads a package from a repository location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Repository`] on fetch failure.
    async fn fetch(&self, location: &RepositoryLocation) -> Result<FetchedPackage>;

    /// Downloads a package from a direct (non-repository) link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Repository`] on fetch failure.
    async fn fetch_direct(&self, url: &str) -> Result<FetchedPackage>;
}

/// Cached fetch-and-register over a [`RepositoryResolver`].
pub struct RepositoryFetcher {
    resolver: Arc<dyn RepositoryResolver>,
    packages: Arc<PackageStore>,
    uploads: Arc<UploadRegistry>,
}

impl RepositoryFetcher {
    /// Creates a fetcher over the given resolver and registries.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn RepositoryResolver>,
        packages: Arc<PackageStore>,
        uploads: Arc<UploadRegistry>,
    ) -> Self {
        Self {
            resolver,
            packages,
            uploads,
        }
    }

    /// Fetches a package from a URL and registers an upload for it.
    ///
    /// Repository URLs go through the repository-key cache; direct links
    /// always fetch and register without a cache key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Repository`] for fetch failures (the message passes
    /// through to the caller) and any store error from registration.
    pub async fn fetch_from_link(&self, url: &str, remote_ip: &str) -> Result<Upload> {
        match self.resolver.parse_url(url).await {
            Ok(location) => self.fetch_from_repository(&location, remote_ip).await,
            Err(Error::RepositoryUnknown { .. }) => {
                tracing::info!(url = url, "fetching direct link");
                let package = self.resolver.fetch_direct(url).await?;
                self.store_and_register(package, remote_ip, None).await
            }
            Err(err) => Err(err),
        }
    }

    /// Fetches a package from a parsed repository location, serving repeat
    /// visits from the upload cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Repository`] on fetch failure and any store error
    /// from registration.
    pub async fn fetch_from_repository(
        &self,
        location: &RepositoryLocation,
        remote_ip: &str,
    ) -> Result<Upload> {
        let key = location.key();
        if let Some(upload) = self.uploads.find_by_repository_key(&key).await? {
            tracing::info!(repository_key = %key, "repository fetch served from cache");
            return Ok(upload);
        }

        tracing::info!(repository_key = %key, "repository fetch missed cache, downloading");
        let package = self.resolver.fetch(location).await?;
        self.store_and_register(package, remote_ip, Some(&key)).await
    }

    async fn store_and_register(
        &self,
        package: FetchedPackage,
        remote_ip: &str,
        repository_key: Option<&str>,
    ) -> Result<Upload> {
        let hash = content_hash(&package.contents);
        let experiment = self.packages.store_or_get(&hash, package.contents).await?;
        self.uploads
            .register(&experiment, &package.filename, remote_ip, repository_key)
            .await
    }
}

/// Resolver test double serving canned locations and packages.
#[derive(Debug, Default)]
pub struct StaticRepositoryResolver {
    urls: HashMap<String, RepositoryLocation>,
    packages: HashMap<String, FetchedPackage>,
    direct: HashMap<String, FetchedPackage>,
}

impl StaticRepositoryResolver {
    /// Creates an empty resolver that knows no repositories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a URL as resolving to a repository location.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>, location: RepositoryLocation) -> Self {
        self.urls.insert(url.into(), location);
        self
    }

    /// Registers the package served at a repository location.
    #[must_use]
    pub fn with_package(
        mut self,
        location: &RepositoryLocation,
        filename: impl Into<String>,
        contents: impl Into<Bytes>,
    ) -> Self {
        self.packages.insert(
            location.key(),
            FetchedPackage {
                filename: filename.into(),
                contents: contents.into(),
            },
        );
        self
    }

    /// Registers the package served at a direct link.
    #[must_use]
    pub fn with_direct(
        mut self,
        url: impl Into<String>,
        filename: impl Into<String>,
        contents: impl Into<Bytes>,
    ) -> Self {
        self.direct.insert(
            url.into(),
            FetchedPackage {
                filename: filename.into(),
                contents: contents.into(),
            },
        );
        self
    }
}

#[async_trait]
impl RepositoryResolver for StaticRepositoryResolver {
    async fn parse_url(&self, url: &str) -> Result<RepositoryLocation> {
        self.urls
            .get(url)
            .cloned()
            .ok_or_else(|| Error::RepositoryUnknown {
                url: url.to_string(),
            })
    }

    async fn fetch(&self, location: &RepositoryLocation) -> Result<FetchedPackage> {
        self.packages
            .get(&location.key())
            .cloned()
            .ok_or_else(|| Error::repository(format!("no package at {}", location.key())))
    }

    async fn fetch_direct(&self, url: &str) -> Result<FetchedPackage> {
        self.direct
            .get(url)
            .cloned()
            .ok_or_else(|| Error::repository(format!("failed to download {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use capsa_core::storage::MemoryObjectStore;

    use crate::metadata::{PackageMetadata, StubMetadataExtractor};
    use crate::store::InMemoryRegistryStore;

    fn fetcher_with(
        resolver: StaticRepositoryResolver,
    ) -> (Arc<InMemoryRegistryStore>, RepositoryFetcher) {
        let db = Arc::new(InMemoryRegistryStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let extractor = Arc::new(StubMetadataExtractor::accepting(PackageMetadata::default()));
        let packages = Arc::new(PackageStore::new(db.clone(), objects, extractor));
        let uploads = Arc::new(UploadRegistry::new(db.clone()));
        (
            db.clone(),
            RepositoryFetcher::new(Arc::new(resolver), packages, uploads),
        )
    }

    #[tokio::test]
    async fn repository_fetch_is_cached_by_key() {
        let location = RepositoryLocation::new("zenodo", "records/42/capsule.rpz");
        let resolver = StaticRepositoryResolver::new()
            .with_url("https://zenodo.example/records/42", location.clone())
            .with_package(&location, "capsule.rpz", "capsule bytes");
        let (db, fetcher) = fetcher_with(resolver);

        let first = fetcher
            .fetch_from_link("https://zenodo.example/records/42", "10.0.0.1")
            .await
            .unwrap();
        let second = fetcher
            .fetch_from_link("https://zenodo.example/records/42", "10.0.0.2")
            .await
            .unwrap();

        // Second visit is a cache hit: same row, no new upload.
        assert_eq!(first.id, second.id);
        assert_eq!(db.upload_count().unwrap(), 1);
        assert_eq!(
            first.repository_key.as_deref(),
            Some("zenodo/records/42/capsule.rpz")
        );
    }

    #[tokio::test]
    async fn direct_links_register_without_a_key() {
        let resolver = StaticRepositoryResolver::new().with_direct(
            "https://example.org/capsule.rpz",
            "capsule.rpz",
            "direct bytes",
        );
        let (db, fetcher) = fetcher_with(resolver);

        let upload = fetcher
            .fetch_from_link("https://example.org/capsule.rpz", "10.0.0.1")
            .await
            .unwrap();
        assert!(upload.repository_key.is_none());
        assert_eq!(db.upload_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn repository_failure_passes_the_message_through() {
        let location = RepositoryLocation::new("zenodo", "records/404");
        let resolver = StaticRepositoryResolver::new()
            .with_url("https://zenodo.example/records/404", location);
        let (_db, fetcher) = fetcher_with(resolver);

        let err = fetcher
            .fetch_from_link("https://zenodo.example/records/404", "10.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Repository { .. }));
        assert!(err.to_string().contains("zenodo/records/404"));
    }

    #[tokio::test]
    async fn unknown_url_with_no_direct_content_fails_as_repository_error() {
        let (_db, fetcher) = fetcher_with(StaticRepositoryResolver::new());
        let err = fetcher
            .fetch_from_link("https://nowhere.example/x", "10.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Repository { .. }));
    }
}
