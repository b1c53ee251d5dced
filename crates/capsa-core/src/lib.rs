//! # capsa-core
//!
//! Core abstractions for the Capsa reproducible-capsule service.
//!
//! This crate provides the foundational types used across all Capsa
//! components:
//!
//! - **Identifiers**: Strongly-typed integer ids and the namespaced
//!   short-id codec for public URLs
//! - **Object Storage**: The blob-store contract for package, input, and
//!   output artifacts
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `capsa-core` is the only crate allowed to define shared primitives.
//! The registry and run layers interact through the contracts defined here.
//!
//! ## Example
//!
//! ```rust
//! use capsa_core::prelude::*;
//!
//! let run = RunId::new(1);
//! let public = run.short_id();
//! assert_eq!(RunId::from_short_id(&public).unwrap(), run);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod hash;
pub mod id;
pub mod observability;
pub mod storage;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use capsa_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::hash::content_hash;
    pub use crate::id::{Namespace, RunId, ShortIdCodec, UploadId, RUN_IDS, UPLOAD_IDS};
    pub use crate::storage::{
        MemoryObjectStore, ObjectMeta, ObjectStore, EXPERIMENT_STORE, INPUT_STORE, OUTPUT_STORE,
        WEB_ARCHIVE_STORE,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use hash::content_hash;
pub use id::{Namespace, RunId, ShortIdCodec, UploadId, RUN_IDS, UPLOAD_IDS};
pub use observability::{init_logging, LogFormat};
pub use storage::{
    MemoryObjectStore, ObjectMeta, ObjectStore, EXPERIMENT_STORE, INPUT_STORE, OUTPUT_STORE,
    WEB_ARCHIVE_STORE,
};
