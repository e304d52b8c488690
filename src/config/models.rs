use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default)]
    pub api: ApiLimits,
}

/// Request limits for task submission
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
    #[serde(default = "default_max_credentials")]
    pub max_credentials: usize,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api: ApiLimits::default(),
        }
    }
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            max_credentials: default_max_credentials(),
            max_messages: default_max_messages(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(5 * 1024 * 1024)
}

fn default_max_credentials() -> usize {
    100
}

fn default_max_messages() -> usize {
    10_000
}

fn default_max_message_chars() -> usize {
    8000
}

/// Outbound Graph API client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    /// Upper bound for one identity check (at most 10s)
    #[serde(default = "default_validate_timeout")]
    pub validate_timeout: HumanDuration,
    /// Upper bound for one comment post (at most 30s)
    #[serde(default = "default_deliver_timeout")]
    pub deliver_timeout: HumanDuration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
            validate_timeout: default_validate_timeout(),
            deliver_timeout: default_deliver_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v19.0".to_string()
}

fn default_user_agent() -> String {
    format!("dispatchbox/{}", env!("CARGO_PKG_VERSION"))
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(5)
}

fn default_validate_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_deliver_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

/// Task dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Delay applied when a submission does not carry one
    #[serde(default = "default_delay_secs")]
    pub default_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Cap on concurrently running tasks; unlimited when unset
    #[serde(default)]
    pub max_running_tasks: Option<usize>,
    /// Characters of the current message shown in status previews
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_delay_secs: default_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            max_running_tasks: None,
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_delay_secs() -> u64 {
    10
}

fn default_max_delay_secs() -> u64 {
    3600
}

fn default_preview_chars() -> usize {
    50
}

/// Retention of finished task records
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_finished_task_ttl")]
    pub finished_task_ttl: HumanDuration,
    #[serde(default = "default_prune_interval")]
    pub prune_interval: HumanDuration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            finished_task_ttl: default_finished_task_ttl(),
            prune_interval: default_prune_interval(),
        }
    }
}

impl RetentionConfig {
    pub fn ttl(&self) -> Duration {
        self.finished_task_ttl.as_duration()
    }
}

fn default_finished_task_ttl() -> HumanDuration {
    HumanDuration::from_secs(24 * 3600)
}

fn default_prune_interval() -> HumanDuration {
    HumanDuration::from_secs(300)
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `tracing-subscriber` filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
