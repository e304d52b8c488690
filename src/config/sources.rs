use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "DISPATCHBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/dispatchbox.toml";
const ENV_PREFIX: &str = "DISPATCHBOX";
const ENV_SEPARATOR: &str = "__";

/// Resolve the config file path: explicit path, then `DISPATCHBOX_CONFIG`, then default
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    load_from_sources(config_path(explicit))
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // DISPATCHBOX__GRAPH__API_VERSION -> graph.api_version
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.graph.api_version, "v19.0");
        assert_eq!(config.dispatch.default_delay_secs, 10);
        assert!(config.dispatch.max_running_tasks.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"

[server.api]
max_payload_bytes = "1MB"
max_messages = 200

[graph]
base_url = "http://localhost:9999"
deliver_timeout = "15s"

[dispatch]
default_delay_secs = 3
max_running_tasks = 4

[retention]
finished_task_ttl = "2h"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.api.max_payload_bytes.as_u64(), 1024 * 1024);
        assert_eq!(config.server.api.max_messages, 200);
        assert_eq!(config.graph.base_url, "http://localhost:9999");
        assert_eq!(config.graph.deliver_timeout.as_duration(), Duration::from_secs(15));
        assert_eq!(config.graph.validate_timeout.as_duration(), Duration::from_secs(10));
        assert_eq!(config.dispatch.default_delay_secs, 3);
        assert_eq!(config.dispatch.max_running_tasks, Some(4));
        assert_eq!(config.retention.ttl(), Duration::from_secs(7200));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = config_path(Some(PathBuf::from("/etc/dispatchbox.toml")));
        assert_eq!(path, PathBuf::from("/etc/dispatchbox.toml"));
    }
}
