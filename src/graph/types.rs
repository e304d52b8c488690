use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Opaque bearer token. Formatting never reveals the full secret.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(Arc::from(token.as_ref()))
    }

    /// The raw token, for the outbound request only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First and last four characters, enough to tell tokens apart in logs
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 12 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Account behind a credential, as reported by the identity endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
}

/// Reason a credential was rejected before use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ValidationFailure {
    pub reason: String,
}

impl ValidationFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result of posting one message with one credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { comment_id: String },
    /// Token revoked or expired; never retried within the run
    CredentialExpired { reason: String },
    /// Token lacks permission for this target
    PermissionDenied { reason: String },
    OtherFailure { reason: String },
}

impl DeliveryOutcome {
    pub fn other(reason: impl Into<String>) -> Self {
        DeliveryOutcome::OtherFailure {
            reason: reason.into(),
        }
    }

    pub fn network(err: impl fmt::Display) -> Self {
        DeliveryOutcome::OtherFailure {
            reason: format!("network error: {err}"),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Failure reason; `None` for deliveries
    pub fn reason(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Delivered { .. } => None,
            DeliveryOutcome::CredentialExpired { reason }
            | DeliveryOutcome::PermissionDenied { reason }
            | DeliveryOutcome::OtherFailure { reason } => Some(reason),
        }
    }
}

/// `{"error": {"message": ..., "code": ...}}` envelope returned by the Graph API
#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorEnvelope {
    pub error: GraphErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

impl GraphErrorBody {
    pub fn describe(&self) -> String {
        let message = self.message.as_deref().unwrap_or("Unknown error");
        match self.code {
            Some(code) => format!("{message} (code {code})"),
            None => message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_formatting_masks_token() {
        let credential = Credential::new("EAABsbCS1iHgBAKZCZA0123456789xyz");
        assert_eq!(credential.masked(), "EAAB…9xyz");
        assert_eq!(format!("{credential}"), "EAAB…9xyz");
        assert!(!format!("{credential:?}").contains("1iHg"));
    }

    #[test]
    fn test_short_credential_fully_masked() {
        assert_eq!(Credential::new("abc").masked(), "****");
    }

    #[test]
    fn test_outcome_reason() {
        let delivered = DeliveryOutcome::Delivered {
            comment_id: "1_2".to_string(),
        };
        assert!(delivered.is_delivered());
        assert_eq!(delivered.reason(), None);

        let failed = DeliveryOutcome::network("connection refused");
        assert_eq!(failed.reason(), Some("network error: connection refused"));
    }
}
