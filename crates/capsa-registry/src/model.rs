//! Experiment and upload records.
//!
//! An [`Experiment`] is the content-addressed record for one unique package:
//! exactly one row exists per distinct content hash, created once and reused
//! by every later submission of the same bytes. An [`Upload`] is one
//! submission event; many uploads may reference the same experiment.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use capsa_core::UploadId;

use crate::extensions::Extension;

/// A parameter declared by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    /// Parameter name.
    pub name: String,
    /// Whether the parameter may be omitted from a run request.
    pub optional: bool,
    /// Default value used by the runner when an optional parameter is
    /// omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// A named file declared by a package, flagged input and/or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSpec {
    /// Logical file name, unique among inputs within an experiment.
    pub name: String,
    /// Path of the file inside the capsule.
    pub path: String,
    /// Whether a run may supply this file as an input.
    pub is_input: bool,
    /// Whether the runner produces this file as an output.
    pub is_output: bool,
}

/// Content-addressed metadata record for one unique package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    /// Hex digest of the package content hash; the primary key.
    pub hash: String,
    /// Parameters declared by the package.
    pub parameters: Vec<ParameterSpec>,
    /// Files declared by the package.
    pub paths: Vec<PathSpec>,
    /// Named extension blobs carried by the package.
    pub extensions: Vec<Extension>,
    /// When the experiment row was created.
    pub created_at: DateTime<Utc>,
    /// When the experiment was last looked at by a user-facing operation.
    pub last_access: DateTime<Utc>,
}

impl Experiment {
    /// Creates a new experiment record with both timestamps set to now.
    #[must_use]
    pub fn new(
        hash: impl Into<String>,
        parameters: Vec<ParameterSpec>,
        paths: Vec<PathSpec>,
        extensions: Vec<Extension>,
    ) -> Self {
        let now = Utc::now();
        Self {
            hash: hash.into(),
            parameters,
            paths,
            extensions,
            created_at: now,
            last_access: now,
        }
    }

    /// Returns the names of all declared parameters.
    #[must_use]
    pub fn parameter_names(&self) -> BTreeSet<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    /// Returns the names of parameters a run request must supply.
    #[must_use]
    pub fn mandatory_parameter_names(&self) -> BTreeSet<&str> {
        self.parameters
            .iter()
            .filter(|p| !p.optional)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Returns the names of files a run may supply as inputs.
    ///
    /// Input names are unique within an experiment; the set is the legal
    /// vocabulary for run-request input fields.
    #[must_use]
    pub fn input_names(&self) -> BTreeSet<&str> {
        self.paths
            .iter()
            .filter(|p| p.is_input)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Looks up a declared path by name.
    #[must_use]
    pub fn path(&self, name: &str) -> Option<&PathSpec> {
        self.paths.iter().find(|p| p.name == name)
    }

    /// Looks up an extension blob by key.
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<&Extension> {
        self.extensions.iter().find(|e| e.name == name)
    }
}

/// One submission event, referencing an [`Experiment`] by content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    /// Store-assigned row id.
    pub id: UploadId,
    /// Content hash of the referenced experiment.
    pub experiment_hash: String,
    /// Original filename as submitted.
    pub filename: String,
    /// IP address the submission came from.
    pub submitted_ip: String,
    /// `source/path` cache key for repository-backed fetches, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_key: Option<String>,
    /// When the upload row was created.
    pub created_at: DateTime<Utc>,
    /// When the upload was last looked at by a user-facing operation.
    pub last_access: DateTime<Utc>,
}

impl Upload {
    /// Returns the public short-id for this upload.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.id.short_id()
    }
}
