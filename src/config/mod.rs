//! Configuration management for dispatchbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use dispatchbox::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `DISPATCHBOX__<section>__<key>`
//!
//! Examples:
//! - `DISPATCHBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `DISPATCHBOX__GRAPH__API_VERSION=v20.0`
//! - `DISPATCHBOX__DISPATCH__MAX_RUNNING_TASKS=8`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/dispatchbox.toml`.
//! This can be overridden using the `DISPATCHBOX_CONFIG` environment variable
//! or the `--config` CLI flag.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    ApiLimits, Config, DispatchConfig, GraphConfig, RetentionConfig, ServerConfig,
    TelemetryConfig,
};
pub use validation::{MAX_DELIVER_TIMEOUT, MAX_VALIDATE_TIMEOUT, ValidationError};

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
    /// The file is `explicit` when given, otherwise `DISPATCHBOX_CONFIG`, otherwise
    /// `config/dispatchbox.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(explicit)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
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

        fs::write(&config_path, "[dispatch]\ndefault_delay_secs = 5\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.dispatch.default_delay_secs, 5);
        assert_eq!(config.graph.base_url, "https://graph.facebook.com");
    }

    #[test]
    fn test_validation_runs_after_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[graph]\nvalidate_timeout = \"1m\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::TimeoutOutOfRange { .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"

[server.api]
max_payload_bytes = "2MB"
max_credentials = 20
max_messages = 500
max_message_chars = 2000

[graph]
base_url = "https://graph.example.com"
api_version = "v20.0"
user_agent = "dispatchbox-test"
connect_timeout = "2s"
validate_timeout = "8s"
deliver_timeout = "20s"

[dispatch]
default_delay_secs = 15
max_delay_secs = 600
max_running_tasks = 2
preview_chars = 40

[retention]
finished_task_ttl = "12h"
prune_interval = "10m"

[telemetry]
log_filter = "dispatchbox=debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.server.api.max_credentials, 20);
        assert_eq!(config.graph.api_version, "v20.0");
        assert_eq!(config.dispatch.max_running_tasks, Some(2));
        assert_eq!(config.dispatch.preview_chars, 40);
        assert_eq!(config.retention.prune_interval.to_string(), "10m");
        assert_eq!(config.telemetry.log_filter, "dispatchbox=debug");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.dispatch.max_running_tasks = Some(3);

        let rendered = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();

        assert_eq!(parsed.dispatch.max_running_tasks, Some(3));
        assert_eq!(parsed.server.bind_addr, config.server.bind_addr);
        assert_eq!(parsed.retention.ttl(), config.retention.ttl());
    }
}
