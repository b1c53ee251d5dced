//! Error types for the run-orchestration domain.

use capsa_core::RunId;

/// The result type used throughout capsa-run.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in run operations.
///
/// The first four variants are client input errors: reported synchronously,
/// with enumerated detail, before anything is persisted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A submitted parameter is not declared by the experiment.
    #[error("unknown parameter {name}")]
    UnknownParameter {
        /// The undeclared parameter name.
        name: String,
    },

    /// Mandatory parameters were left unset.
    ///
    /// Carries every missing name, not just the first.
    #[error("missing value for parameters: {}", names.join(", "))]
    MissingParameters {
        /// All mandatory parameter names still unsatisfied.
        names: Vec<String>,
    },

    /// A submitted input file is not declared by the experiment.
    #[error("unknown input file {name}")]
    UnknownInputFile {
        /// The undeclared input name.
        name: String,
    },

    /// A requested port failed to parse or is out of range.
    #[error("invalid port number {token:?}")]
    InvalidPort {
        /// The offending token, verbatim.
        token: String,
    },

    /// A run row was not found.
    #[error("run not found: {run_id}")]
    RunNotFound {
        /// The row id that was looked up.
        run_id: RunId,
    },

    /// The runner queue rejected the enqueue.
    #[error("dispatch error: {message}")]
    Dispatch {
        /// Description of the dispatch failure.
        message: String,
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
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new dispatch error.
    #[must_use]
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch {
            message: message.into(),
        }
    }

    /// Returns true for client input errors: bad run requests that were
    /// rejected before any state was persisted.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownParameter { .. }
                | Self::MissingParameters { .. }
                | Self::UnknownInputFile { .. }
                | Self::InvalidPort { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameters_lists_every_name() {
        let err = Error::MissingParameters {
            names: vec!["alpha".into(), "gamma".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("alpha"));
        assert!(msg.contains("gamma"));
    }

    #[test]
    fn invalid_port_cites_the_token() {
        let err = Error::InvalidPort {
            token: "99999".into(),
        };
        assert!(err.to_string().contains("99999"));
    }

    #[test]
    fn client_error_classification() {
        assert!(Error::UnknownParameter { name: "x".into() }.is_client_error());
        assert!(Error::InvalidPort { token: "x".into() }.is_client_error());
        assert!(!Error::storage("disk on fire").is_client_error());
        assert!(!Error::RunNotFound {
            run_id: RunId::new(1)
        }
        .is_client_error());
    }
}
