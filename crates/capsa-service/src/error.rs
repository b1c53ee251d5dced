//! Error types for the service layer.
//!
//! The facade wraps the errors of the layers it composes. Classification
//! helpers let a presentation tier map an error to a response without
//! matching every underlying variant itself: malformed ids and bad run
//! requests are the caller's fault, missing rows are distinct from both.

/// The result type used throughout capsa-service.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by service operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from capsa-core (ids, object storage).
    #[error("core error: {0}")]
    Core(#[from] capsa_core::Error),

    /// An error from the package registry.
    #[error("registry error: {0}")]
    Registry(#[from] capsa_registry::Error),

    /// An error from run orchestration.
    #[error("run error: {0}")]
    Run(#[from] capsa_run::Error),
}

impl Error {
    /// Returns true if the error is a malformed public short-id.
    ///
    /// Distinct from [`Error::is_not_found`]: the string never named a row
    /// at all.
    #[must_use]
    pub const fn is_invalid_id(&self) -> bool {
        matches!(self, Self::Core(capsa_core::Error::InvalidId { .. }))
    }

    /// Returns true if a well-formed id had no matching row.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Core(
                capsa_core::Error::ResourceNotFound { .. } | capsa_core::Error::NotFound(_)
            ) | Self::Registry(capsa_registry::Error::UploadNotFound { .. })
                | Self::Run(capsa_run::Error::RunNotFound { .. })
        )
    }

    /// Returns true for errors caused by the request itself: malformed ids,
    /// rejected packages, and invalid run requests.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Core(capsa_core::Error::InvalidId { .. })
            | Self::Registry(capsa_registry::Error::InvalidPackage { .. }) => true,
            Self::Run(err) => err.is_client_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_id_is_distinct_from_not_found() {
        let invalid = Error::Core(capsa_core::Error::InvalidId {
            message: "bad prefix".into(),
        });
        assert!(invalid.is_invalid_id());
        assert!(!invalid.is_not_found());

        let missing = Error::Run(capsa_run::Error::RunNotFound {
            run_id: capsa_core::RunId::new(404),
        });
        assert!(missing.is_not_found());
        assert!(!missing.is_invalid_id());
    }

    #[test]
    fn client_error_classification() {
        assert!(Error::Registry(capsa_registry::Error::invalid_package("bad bytes"))
            .is_client_error());
        assert!(Error::Run(capsa_run::Error::InvalidPort {
            token: "99999".into()
        })
        .is_client_error());
        assert!(!Error::Core(capsa_core::Error::storage("bucket down")).is_client_error());
    }
}
