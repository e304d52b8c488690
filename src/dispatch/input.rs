//! Submission normalization
//!
//! Messages are trimmed and blank lines dropped before a task is registered, so
//! `total_messages` only ever counts messages that will actually be attempted.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::config::Config;
use crate::graph::Credential;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("at least one access token is required")]
    NoCredentials,
    #[error("too many access tokens: {count} (limit {max})")]
    TooManyCredentials { count: usize, max: usize },
    #[error("target id is required")]
    MissingTarget,
    #[error("target id '{0}' contains characters that are not allowed")]
    InvalidTarget(String),
    #[error("no messages found")]
    NoMessages,
    #[error("too many messages: {count} (limit {max})")]
    TooManyMessages { count: usize, max: usize },
    #[error("message {index} is {chars} characters long (limit {max})")]
    MessageTooLong { index: usize, chars: usize, max: usize },
    #[error("delay must be between 1 and {max} seconds, got {delay}")]
    InvalidDelay { delay: u64, max: u64 },
}

/// Raw task submission as received from a caller
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub tenant: String,
    pub credentials: Vec<String>,
    pub target_id: String,
    pub messages: Vec<String>,
    /// Seconds between messages; the configured default when unset
    pub delay_secs: Option<u64>,
    pub idempotency_key: Option<String>,
}

/// Bounds applied to every submission
#[derive(Debug, Clone)]
pub struct InputLimits {
    pub max_credentials: usize,
    pub max_messages: usize,
    pub max_message_chars: usize,
    pub default_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for InputLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_credentials: config.server.api.max_credentials,
            max_messages: config.server.api.max_messages,
            max_message_chars: config.server.api.max_message_chars,
            default_delay_secs: config.dispatch.default_delay_secs,
            max_delay_secs: config.dispatch.max_delay_secs,
        }
    }
}

/// A submission that passed normalization
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub tenant: String,
    pub credentials: Vec<Credential>,
    pub target_id: String,
    pub messages: Vec<String>,
    pub delay_secs: u64,
    pub idempotency_key: Option<String>,
}

impl PreparedRequest {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Split uploaded text into lines, trimming each and dropping blanks
pub fn split_lines(text: &str) -> Vec<String> {
    normalize_messages(text.lines())
}

/// Trim messages and drop the ones that are blank, keeping order
pub fn normalize_messages<I, S>(messages: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    messages
        .into_iter()
        .map(|m| m.as_ref().trim().to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

/// Trim tokens, drop blanks and repeats (first occurrence wins)
pub fn normalize_credentials<I, S>(tokens: I) -> Vec<Credential>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter_map(|token| {
            let token = token.as_ref().trim();
            (!token.is_empty() && seen.insert(token.to_string())).then(|| Credential::new(token))
        })
        .collect()
}

/// Normalize and bound-check a submission
pub fn prepare(request: TaskRequest, limits: &InputLimits) -> Result<PreparedRequest, RequestError> {
    let credentials = normalize_credentials(&request.credentials);
    if credentials.is_empty() {
        return Err(RequestError::NoCredentials);
    }
    if credentials.len() > limits.max_credentials {
        return Err(RequestError::TooManyCredentials {
            count: credentials.len(),
            max: limits.max_credentials,
        });
    }

    let target_id = request.target_id.trim().to_string();
    if target_id.is_empty() {
        return Err(RequestError::MissingTarget);
    }
    if target_id
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '&' | '%'))
    {
        return Err(RequestError::InvalidTarget(target_id));
    }

    let messages = normalize_messages(&request.messages);
    if messages.is_empty() {
        return Err(RequestError::NoMessages);
    }
    if messages.len() > limits.max_messages {
        return Err(RequestError::TooManyMessages {
            count: messages.len(),
            max: limits.max_messages,
        });
    }
    for (index, message) in messages.iter().enumerate() {
        let chars = message.chars().count();
        if chars > limits.max_message_chars {
            return Err(RequestError::MessageTooLong {
                index: index + 1,
                chars,
                max: limits.max_message_chars,
            });
        }
    }

    let delay_secs = request.delay_secs.unwrap_or(limits.default_delay_secs);
    if delay_secs == 0 || delay_secs > limits.max_delay_secs {
        return Err(RequestError::InvalidDelay {
            delay: delay_secs,
            max: limits.max_delay_secs,
        });
    }

    let tenant = match request.tenant.trim() {
        "" => "default".to_string(),
        tenant => tenant.to_string(),
    };

    Ok(PreparedRequest {
        tenant,
        credentials,
        target_id,
        messages,
        delay_secs,
        idempotency_key: request
            .idempotency_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TaskRequest {
        TaskRequest {
            tenant: String::new(),
            credentials: vec!["token-a".to_string(), "token-b".to_string()],
            target_id: "123_456".to_string(),
            messages: vec!["hello".to_string(), "world".to_string()],
            delay_secs: Some(5),
            idempotency_key: None,
        }
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let lines = split_lines("first\n\n   \n second \r\nthird\n");
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_duplicate_credentials_dropped_in_order() {
        let creds = normalize_credentials(["b", " a ", "b", "", "c"]);
        let tokens: Vec<&str> = creds.iter().map(Credential::expose).collect();
        assert_eq!(tokens, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_prepare_accepts_valid_request() {
        let prepared = prepare(request(), &InputLimits::default()).unwrap();
        assert_eq!(prepared.tenant, "default");
        assert_eq!(prepared.credentials.len(), 2);
        assert_eq!(prepared.messages.len(), 2);
        assert_eq!(prepared.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_prepare_counts_only_non_blank_messages() {
        let mut req = request();
        req.messages = vec!["one".into(), "".into(), "  ".into(), "two".into()];
        let prepared = prepare(req, &InputLimits::default()).unwrap();
        assert_eq!(prepared.messages, vec!["one", "two"]);
    }

    #[test]
    fn test_prepare_uses_default_delay() {
        let mut req = request();
        req.delay_secs = None;
        let prepared = prepare(req, &InputLimits::default()).unwrap();
        assert_eq!(prepared.delay_secs, 10);
    }

    #[test]
    fn test_prepare_rejections() {
        let limits = InputLimits::default();

        let mut req = request();
        req.credentials = vec!["  ".into()];
        assert_eq!(prepare(req, &limits).unwrap_err(), RequestError::NoCredentials);

        let mut req = request();
        req.target_id = " ".into();
        assert_eq!(prepare(req, &limits).unwrap_err(), RequestError::MissingTarget);

        let mut req = request();
        req.target_id = "123/feed".into();
        assert!(matches!(prepare(req, &limits), Err(RequestError::InvalidTarget(_))));

        let mut req = request();
        req.messages = vec!["\n".into(), "".into()];
        assert_eq!(prepare(req, &limits).unwrap_err(), RequestError::NoMessages);

        let mut req = request();
        req.delay_secs = Some(0);
        assert!(matches!(prepare(req, &limits), Err(RequestError::InvalidDelay { delay: 0, .. })));
    }

    #[test]
    fn test_prepare_enforces_limits() {
        let limits = InputLimits {
            max_credentials: 1,
            max_messages: 1,
            max_message_chars: 3,
            ..InputLimits::default()
        };

        let err = prepare(request(), &limits).unwrap_err();
        assert_eq!(err, RequestError::TooManyCredentials { count: 2, max: 1 });

        let mut req = request();
        req.credentials.truncate(1);
        assert_eq!(
            prepare(req.clone(), &limits).unwrap_err(),
            RequestError::TooManyMessages { count: 2, max: 1 }
        );

        req.messages = vec!["hello".into()];
        assert_eq!(
            prepare(req, &limits).unwrap_err(),
            RequestError::MessageTooLong { index: 1, chars: 5, max: 3 }
        );
    }
}
