//! Maps raw Graph API responses onto validation results and delivery outcomes

use serde::Deserialize;

use super::types::{DeliveryOutcome, GraphErrorEnvelope, Identity, ValidationFailure};

/// Error code for an expired or revoked access token
pub const CODE_TOKEN_EXPIRED: i64 = 190;
/// Error codes for insufficient permission on the target
pub const CODES_PERMISSION_DENIED: [i64; 2] = [10, 200];

#[derive(Debug, Deserialize)]
struct CreatedObject {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct IdentityBody {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

/// Classify the response to a comment post
pub fn classify_delivery(status: u16, body: &[u8]) -> DeliveryOutcome {
    if let Ok(envelope) = serde_json::from_slice::<GraphErrorEnvelope>(body) {
        let reason = envelope.error.describe();
        return match envelope.error.code {
            Some(CODE_TOKEN_EXPIRED) => DeliveryOutcome::CredentialExpired { reason },
            Some(code) if CODES_PERMISSION_DENIED.contains(&code) => {
                DeliveryOutcome::PermissionDenied { reason }
            }
            _ => DeliveryOutcome::OtherFailure {
                reason: envelope
                    .error
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
        };
    }

    let created = match serde_json::from_slice::<CreatedObject>(body) {
        Ok(created) => created,
        Err(e) => return DeliveryOutcome::network(format!("malformed response body: {e}")),
    };

    if !(200..300).contains(&status) {
        return DeliveryOutcome::other(format!("HTTP {status}"));
    }

    match created.id {
        Some(serde_json::Value::String(id)) if !id.is_empty() => {
            DeliveryOutcome::Delivered { comment_id: id }
        }
        Some(serde_json::Value::Number(id)) => DeliveryOutcome::Delivered {
            comment_id: id.to_string(),
        },
        _ => DeliveryOutcome::other("response did not include a comment id"),
    }
}

/// Classify the response to an identity lookup
pub fn classify_identity(status: u16, body: &[u8]) -> Result<Identity, ValidationFailure> {
    if let Ok(envelope) = serde_json::from_slice::<GraphErrorEnvelope>(body) {
        return Err(ValidationFailure::new(envelope.error.describe()));
    }

    if !(200..300).contains(&status) {
        return Err(ValidationFailure::new(format!("HTTP {status}")));
    }

    let identity: IdentityBody = serde_json::from_slice(body)
        .map_err(|e| ValidationFailure::new(format!("malformed response body: {e}")))?;

    if identity.id.is_empty() {
        return Err(ValidationFailure::new("response did not include an account id"));
    }

    Ok(Identity {
        name: identity.name.unwrap_or_else(|| "Unknown".to_string()),
        id: identity.id,
    })
}
