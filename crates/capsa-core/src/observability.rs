//! Observability infrastructure for Capsa.
//!
//! Structured logging with consistent spans across all components. This
//! module provides the initialization helper and span constructors used by
//! the registry and run layers.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `capsa_run=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for package-registry operations.
///
/// # Example
///
/// ```rust
/// use capsa_core::observability::registry_span;
///
/// let span = registry_span("store_or_get", "2c26b46b68ffc68f");
/// let _guard = span.enter();
/// // ... registry operation
/// ```
#[must_use]
pub fn registry_span(operation: &str, experiment_hash: &str) -> Span {
    tracing::info_span!(
        "registry",
        op = operation,
        experiment = experiment_hash,
    )
}

/// Creates a span for run-orchestration operations.
#[must_use]
pub fn run_span(operation: &str, run_id: i64) -> Span {
    tracing::info_span!(
        "run",
        op = operation,
        run_id = run_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn span_helpers_create_spans() {
        let span = registry_span("store_or_get", "abc");
        let _guard = span.enter();
        tracing::info!("message in registry span");

        let span = run_span("create_run", 7);
        let _guard = span.enter();
        tracing::info!("message in run span");
    }
}
