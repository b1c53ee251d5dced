//! Error types for the package-registry domain.

/// The result type used throughout capsa-registry.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The metadata extractor rejected the uploaded bytes.
    ///
    /// Nothing is persisted when this is raised.
    #[error("invalid package: {message}")]
    InvalidPackage {
        /// The extractor's rejection message.
        message: String,
    },

    /// The URL does not belong to any known data repository.
    #[error("unknown repository: {url}")]
    RepositoryUnknown {
        /// The URL that could not be matched to a repository.
        url: String,
    },

    /// A known repository failed to resolve or serve the package.
    ///
    /// The message is passed through to the caller verbatim.
    #[error("repository error: {message}")]
    Repository {
        /// Description of the repository failure.
        message: String,
    },

    /// An upload row was not found.
    #[error("upload not found: {id}")]
    UploadNotFound {
        /// The row id that was looked up.
        id: capsa_core::UploadId,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error from capsa-core.
    #[error("core error: {0}")]
    Core(#[from] capsa_core::Error),
}

impl Error {
    /// Creates a new invalid-package error.
    #[must_use]
    pub fn invalid_package(message: impl Into<String>) -> Self {
        Self::InvalidPackage {
            message: message.into(),
        }
    }

    /// Creates a new repository error.
    #[must_use]
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository {
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error is a uniqueness-constraint conflict from
    /// the underlying store.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Core(capsa_core::Error::Conflict { .. }))
    }
}
