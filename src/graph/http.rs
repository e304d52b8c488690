//! reqwest-backed Graph API client

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::classify::{classify_delivery, classify_identity};
use super::types::{Credential, DeliveryOutcome, Identity, ValidationFailure};
use super::{CredentialValidator, DeliveryClient};
use crate::config::GraphConfig;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("HTTP client setup failed: {0}")]
    ClientBuild(String),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub api_version: String,
    pub connect_timeout: Duration,
    pub validate_timeout: Duration,
    pub deliver_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&GraphConfig::default())
    }
}

impl From<&GraphConfig> for HttpConfig {
    fn from(config: &GraphConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            connect_timeout: config.connect_timeout.as_duration(),
            validate_timeout: config.validate_timeout.as_duration(),
            deliver_timeout: config.deliver_timeout.as_duration(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Graph API client implementing both credential validation and delivery
pub struct GraphClient {
    client: Client,
    config: HttpConfig,
}

impl GraphClient {
    /// Create a new Graph client
    pub fn new(config: HttpConfig) -> Result<Self> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(GraphError::InvalidUrl(config.base_url));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| GraphError::ClientBuild(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.config.base_url, self.config.api_version, path)
    }

    /// Send a request and collect `(status, body)`; errors are transport-level only
    async fn exchange(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<(u16, Vec<u8>), String> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                "request timed out".to_string()
            } else if e.is_connect() {
                format!("connection failed: {e}")
            } else {
                e.to_string()
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| format!("failed to read body: {e}"))?;

        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl CredentialValidator for GraphClient {
    async fn validate(&self, credential: &Credential) -> std::result::Result<Identity, ValidationFailure> {
        let request = self
            .client
            .get(self.endpoint("me"))
            .query(&[("fields", "id,name"), ("access_token", credential.expose())])
            .timeout(self.config.validate_timeout);

        let (status, body) = self
            .exchange(request)
            .await
            .map_err(|e| ValidationFailure::new(format!("network error: {e}")))?;

        let result = classify_identity(status, &body);
        match &result {
            Ok(identity) => debug!(credential = %credential, account = %identity.id, "Credential valid"),
            Err(failure) => warn!(credential = %credential, status, reason = %failure, "Credential rejected"),
        }
        result
    }
}

#[async_trait]
impl DeliveryClient for GraphClient {
    async fn deliver(&self, credential: &Credential, target_id: &str, message: &str) -> DeliveryOutcome {
        let request = self
            .client
            .post(self.endpoint(&format!("{target_id}/comments")))
            .form(&[("message", message), ("access_token", credential.expose())])
            .timeout(self.config.deliver_timeout);

        let outcome = match self.exchange(request).await {
            Ok((status, body)) => classify_delivery(status, &body),
            Err(e) => DeliveryOutcome::network(e),
        };

        match &outcome {
            DeliveryOutcome::Delivered { comment_id } => {
                debug!(credential = %credential, target_id, comment_id = %comment_id, "Message delivered")
            }
            other => {
                warn!(credential = %credential, target_id, reason = other.reason().unwrap_or_default(), "Delivery failed")
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.base_url, "https://graph.facebook.com");
        assert_eq!(config.api_version, "v19.0");
        assert_eq!(config.validate_timeout, Duration::from_secs(10));
        assert_eq!(config.deliver_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_endpoint_joins_version_and_path() {
        let client = GraphClient::new(HttpConfig {
            base_url: "http://localhost:1234".to_string(),
            ..HttpConfig::default()
        })
        .unwrap();

        assert_eq!(
            client.endpoint("123_456/comments"),
            "http://localhost:1234/v19.0/123_456/comments"
        );
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let result = GraphClient::new(HttpConfig {
            base_url: "graph.facebook.com".to_string(),
            ..HttpConfig::default()
        });
        assert!(matches!(result, Err(GraphError::InvalidUrl(_))));
    }
}
