//! Service configuration.
//!
//! Environment variables are the canonical runtime configuration path;
//! every value has a default suitable for local development.

use serde::{Deserialize, Serialize};

use capsa_core::{Error, LogFormat, Result};

/// Configuration for the Capsa service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Enable debug mode (pretty logs instead of JSON).
    pub debug: bool,

    /// Object storage bucket name backing the blob stores.
    ///
    /// Unset means the in-memory backend, for development and tests.
    #[serde(default)]
    pub storage_bucket: Option<String>,

    /// Capacity of the bounded runner queue.
    pub runner_queue_capacity: usize,

    /// Proxy domain under which exposed run ports are reachable
    /// (e.g. `web.capsa.example.org`). Unset disables interactive links.
    #[serde(default)]
    pub web_proxy_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            storage_bucket: None,
            runner_queue_capacity: 64,
            web_proxy_url: None,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `CAPSA_DEBUG`
    /// - `CAPSA_STORAGE_BUCKET`
    /// - `CAPSA_RUNNER_QUEUE_CAPACITY`
    /// - `CAPSA_WEB_PROXY_URL`
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed, or
    /// if the queue capacity is zero.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(debug) = env_bool("CAPSA_DEBUG")? {
            config.debug = debug;
        }
        if let Some(bucket) = env_string("CAPSA_STORAGE_BUCKET") {
            config.storage_bucket = Some(bucket);
        }
        if let Some(capacity) = env_usize("CAPSA_RUNNER_QUEUE_CAPACITY")? {
            if capacity == 0 {
                return Err(Error::InvalidInput(
                    "CAPSA_RUNNER_QUEUE_CAPACITY must be greater than 0".to_string(),
                ));
            }
            config.runner_queue_capacity = capacity;
        }
        if let Some(url) = env_string("CAPSA_WEB_PROXY_URL") {
            config.web_proxy_url = Some(url);
        }

        Ok(config)
    }

    /// Returns the log format implied by the debug flag.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        if self.debug {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<usize>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &v).map(Some)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_suit_local_development() {
        let config = Config::default();
        assert!(!config.debug);
        assert!(config.storage_bucket.is_none());
        assert_eq!(config.runner_queue_capacity, 64);
        assert!(config.web_proxy_url.is_none());
    }

    #[test]
    fn log_format_follows_debug_flag() {
        let mut config = Config::default();
        assert!(matches!(config.log_format(), LogFormat::Json));
        config.debug = true;
        assert!(matches!(config.log_format(), LogFormat::Pretty));
    }

    #[test]
    fn parse_bool_accepts_true_values() {
        assert!(parse_bool("TEST", "true").unwrap());
        assert!(parse_bool("TEST", "1").unwrap());
        assert!(parse_bool("TEST", "yes").unwrap());
        assert!(parse_bool("TEST", "TRUE").unwrap());
    }

    #[test]
    fn parse_bool_accepts_false_values() {
        assert!(!parse_bool("TEST", "false").unwrap());
        assert!(!parse_bool("TEST", "0").unwrap());
        assert!(!parse_bool("TEST", "no").unwrap());
        assert!(!parse_bool("TEST", "FALSE").unwrap());
    }

    #[test]
    fn parse_bool_rejects_invalid_values() {
        assert!(parse_bool("TEST", "maybe").is_err());
        assert!(parse_bool("TEST", "").is_err());
    }
}
