//! # capsa-service
//!
//! Composition layer for the Capsa reproducible-capsule service.
//!
//! This crate wires the registry and run layers into the single surface a
//! presentation tier talks to:
//!
//! - **Configuration**: environment-derived [`Config`]
//! - **Facade**: [`CapsaService`] - upload, repository fetch, run creation,
//!   status polling, artifact links
//! - **Health**: dependency probes plus a shutting-down flag that fails
//!   readiness promptly
//!
//! HTTP routing, page rendering, and the execution engine live elsewhere;
//! this crate ends at the operations themselves.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use capsa_registry::metadata::StubMetadataExtractor;
//! use capsa_registry::repository::StaticRepositoryResolver;
//! use capsa_run::dispatch::ChannelRunner;
//! use capsa_service::{CapsaService, Config};
//!
//! # fn main() -> capsa_core::Result<()> {
//! let config = Config::from_env()?;
//! capsa_core::init_logging(config.log_format());
//!
//! let (runner, _worker) = ChannelRunner::bounded(config.runner_queue_capacity);
//! let service = CapsaService::with_memory_backends(
//!     config,
//!     Arc::new(StubMetadataExtractor::default()),
//!     Arc::new(StaticRepositoryResolver::new()),
//!     Arc::new(runner),
//! );
//! # let _ = service;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod service;

// Re-export key types at crate root for ergonomics
pub use config::Config;
pub use error::{Error, Result};
pub use service::{CapsaService, HealthReport, OutputLink, WebArchiveLink};
