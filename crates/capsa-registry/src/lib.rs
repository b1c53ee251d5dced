//! # capsa-registry
//!
//! Content-addressable package store and upload registry for Capsa.
//!
//! This crate implements the submission side of the capsule lifecycle:
//!
//! - **Package Store**: one [`Experiment`](model::Experiment) per distinct
//!   content hash, created once and reused by every later submission of the
//!   same bytes
//! - **Upload Registry**: one [`Upload`](model::Upload) row per submission
//!   event, with a read-side cache keyed by external-repository location
//! - **Metadata Extraction**: the seam through which package declarations
//!   (parameters, files, extensions) are parsed out of uploaded bytes
//! - **Repository Fetch**: cached resolution of external data-repository
//!   URLs into registered uploads
//!
//! ## Guarantees
//!
//! - Exactly one experiment row exists per content hash; racing writers on
//!   a novel hash converge on the winner's row
//! - A rejected package persists nothing
//! - A committed experiment row always has its blob in object storage

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod extensions;
pub mod metadata;
pub mod model;
pub mod package_store;
pub mod repository;
pub mod store;
pub mod uploads;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use extensions::{
    Extension, ExtensionData, WebArchiveConfig, WebArchiveExtension, WebArchiveHost,
    WEB_ARCHIVE_EXTENSION,
};
pub use metadata::{MetadataExtractor, PackageMetadata, StubMetadataExtractor};
pub use model::{Experiment, ParameterSpec, PathSpec, Upload};
pub use package_store::PackageStore;
pub use repository::{
    FetchedPackage, RepositoryFetcher, RepositoryLocation, RepositoryResolver,
    StaticRepositoryResolver,
};
pub use store::{InMemoryRegistryStore, NewUpload, RegistryStore};
pub use uploads::UploadRegistry;
