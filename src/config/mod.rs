//! Configuration management for bookfetch
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use bookfetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Fetching with {} workers", config.download.concurrency);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `BOOKFETCH__<section>__<key>`
//!
//! Examples:
//! - `BOOKFETCH__DOWNLOAD__CONCURRENCY=16`
//! - `BOOKFETCH__ARCHIVE__BASE_URL=http://localhost:9000`
//!
//! Account credentials are read from `BOOKFETCH_EMAIL` and `BOOKFETCH_PASSWORD`
//! and are never taken from the configuration file.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/bookfetch.toml`.
//! This can be overridden using the `BOOKFETCH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{ArchiveConfig, Config, DownloadConfig, HttpConfig};
pub use validation::{MAX_RESOLUTION, ValidationError};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`BOOKFETCH__*`)
    /// 2. TOML file (default: `config/bookfetch.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a value
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load configuration, preferring `path` over the default file location
    pub fn load_with(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Re-check the configuration after command-line overrides were applied
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[download]\nconcurrency = 4\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.download.concurrency, 4);
        assert_eq!(config.download.max_retries, 3);
    }

    #[test]
    fn test_validation_runs_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[download]\nresolution = 42\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::ResolutionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[archive]
base_url = "https://archive.org"
user_agent = "bookfetch-test/1.0"

[http]
connect_timeout_secs = 15
request_timeout_secs = 120

[download]
concurrency = 32
max_retries = 4
retry_backoff_ms = 1500
max_session_renewals = 3
resolution = 2
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.archive.user_agent, "bookfetch-test/1.0");
        assert_eq!(config.http.request_timeout_secs, 120);
        assert_eq!(config.download.concurrency, 32);

        let policy = config.download.retry_policy();
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.max_session_renewals, 3);
        assert_eq!(policy.backoff.as_millis(), 1500);
    }

    #[test]
    fn test_overrides_revalidated() {
        let mut config = Config::default();
        config.download.concurrency = 0;

        assert!(config.validate().is_err());
    }
}
