//! Package metadata extraction interface.
//!
//! Parsing a capsule's declared parameters and files out of its bytes is an
//! external collaborator. This module defines the seam the package store
//! calls through, plus a stub implementation for tests and development.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::extensions::Extension;
use crate::model::{ParameterSpec, PathSpec};

/// Declarations extracted from a package.
#[derive(Debug, Clone, Default)]
pub struct PackageMetadata {
    /// Parameters the package declares.
    pub parameters: Vec<ParameterSpec>,
    /// Files the package declares.
    pub paths: Vec<PathSpec>,
    /// Named extension blobs the package carries.
    pub extensions: Vec<Extension>,
}

/// Extracts declared metadata from package bytes.
///
/// Rejection means the bytes are not a valid capsule; the store persists
/// nothing in that case.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Parses the package and returns its declarations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPackage`] when the bytes are not a readable
    /// capsule.
    async fn parse(&self, hash: &str, package: &Bytes) -> Result<PackageMetadata>;
}

/// Stub extractor for tests and development.
///
/// Returns a fixed [`PackageMetadata`] for every package, or rejects every
/// package when constructed with [`StubMetadataExtractor::rejecting`].
#[derive(Debug, Clone, Default)]
pub struct StubMetadataExtractor {
    metadata: PackageMetadata,
    rejection: Option<String>,
}

impl StubMetadataExtractor {
    /// Creates a stub that accepts every package with the given metadata.
    #[must_use]
    pub fn accepting(metadata: PackageMetadata) -> Self {
        Self {
            metadata,
            rejection: None,
        }
    }

    /// Creates a stub that rejects every package with the given message.
    #[must_use]
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            metadata: PackageMetadata::default(),
            rejection: Some(message.into()),
        }
    }
}

#[async_trait]
impl MetadataExtractor for StubMetadataExtractor {
    async fn parse(&self, _hash: &str, _package: &Bytes) -> Result<PackageMetadata> {
        match &self.rejection {
            Some(message) => Err(Error::invalid_package(message.clone())),
            None => Ok(self.metadata.clone()),
        }
    }
}
