use super::models::Config;
use std::time::Duration;
use thiserror::Error;

/// Longest identity check the dispatcher will wait for
pub const MAX_VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest comment post the dispatcher will wait for
pub const MAX_DELIVER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("graph.base_url must be an http(s) url, got '{0}'")]
    InvalidBaseUrl(String),

    #[error("graph.api_version must look like 'v19.0', got '{0}'")]
    InvalidApiVersion(String),

    #[error("{field} must be between 1ms and {max:?}, got {actual:?}")]
    TimeoutOutOfRange {
        field: &'static str,
        actual: Duration,
        max: Duration,
    },

    #[error("dispatch.default_delay_secs ({default}) must be between 1 and max_delay_secs ({max})")]
    InvalidDefaultDelay { default: u64, max: u64 },

    #[error("dispatch.max_running_tasks must be positive when set")]
    InvalidRunningTaskCap,

    #[error("{0} must be positive")]
    NotPositive(&'static str),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_graph(config)?;
    validate_dispatch(config)?;
    validate_limits(config)?;
    validate_retention(config)?;
    Ok(())
}

fn validate_graph(config: &Config) -> Result<(), ValidationError> {
    let graph = &config.graph;

    if !graph.base_url.starts_with("http://") && !graph.base_url.starts_with("https://") {
        return Err(ValidationError::InvalidBaseUrl(graph.base_url.clone()));
    }

    let version_ok = graph
        .api_version
        .strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.'));
    if !version_ok {
        return Err(ValidationError::InvalidApiVersion(graph.api_version.clone()));
    }

    check_timeout("graph.connect_timeout", graph.connect_timeout.as_duration(), MAX_DELIVER_TIMEOUT)?;
    check_timeout("graph.validate_timeout", graph.validate_timeout.as_duration(), MAX_VALIDATE_TIMEOUT)?;
    check_timeout("graph.deliver_timeout", graph.deliver_timeout.as_duration(), MAX_DELIVER_TIMEOUT)?;

    Ok(())
}

fn check_timeout(field: &'static str, actual: Duration, max: Duration) -> Result<(), ValidationError> {
    if actual.is_zero() || actual > max {
        return Err(ValidationError::TimeoutOutOfRange { field, actual, max });
    }
    Ok(())
}

fn validate_dispatch(config: &Config) -> Result<(), ValidationError> {
    let dispatch = &config.dispatch;

    if dispatch.default_delay_secs == 0 || dispatch.default_delay_secs > dispatch.max_delay_secs {
        return Err(ValidationError::InvalidDefaultDelay {
            default: dispatch.default_delay_secs,
            max: dispatch.max_delay_secs,
        });
    }

    if dispatch.max_running_tasks == Some(0) {
        return Err(ValidationError::InvalidRunningTaskCap);
    }

    if dispatch.preview_chars == 0 {
        return Err(ValidationError::NotPositive("dispatch.preview_chars"));
    }

    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    let api = &config.server.api;

    if api.max_payload_bytes.as_u64() == 0 {
        return Err(ValidationError::NotPositive("server.api.max_payload_bytes"));
    }
    if api.max_credentials == 0 {
        return Err(ValidationError::NotPositive("server.api.max_credentials"));
    }
    if api.max_messages == 0 {
        return Err(ValidationError::NotPositive("server.api.max_messages"));
    }
    if api.max_message_chars == 0 {
        return Err(ValidationError::NotPositive("server.api.max_message_chars"));
    }

    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.finished_task_ttl.as_duration().is_zero() {
        return Err(ValidationError::NotPositive("retention.finished_task_ttl"));
    }
    if config.retention.prune_interval.as_duration().is_zero() {
        return Err(ValidationError::NotPositive("retention.prune_interval"));
    }
    Ok(())
}
