use thiserror::Error;

use super::models::SubmitTaskRequest;
use crate::dispatch::{TaskRequest, split_lines};

pub const MAX_TENANT_LEN: usize = 64;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("tenant must be at most {} characters", MAX_TENANT_LEN)]
    TenantTooLong,
    #[error("tenant may only contain letters, digits, '-', '_' and '.'")]
    InvalidTenant,
    #[error("idempotency key must be at most {} characters", MAX_IDEMPOTENCY_KEY_LEN)]
    IdempotencyKeyTooLong,
    #[error("either messages or messages_text is required")]
    MissingMessages,
    #[error("either credentials or credentials_text is required")]
    MissingCredentials,
}

/// Check header-derived fields and merge list and text inputs into a [`TaskRequest`].
///
/// Content limits (counts, lengths, delay bounds) are checked later by the dispatcher.
pub fn build_task_request(
    payload: SubmitTaskRequest,
    tenant: Option<String>,
    idempotency_key: Option<String>,
) -> Result<TaskRequest, PayloadError> {
    let tenant = tenant.unwrap_or_default();
    if tenant.chars().count() > MAX_TENANT_LEN {
        return Err(PayloadError::TenantTooLong);
    }
    if !tenant
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(PayloadError::InvalidTenant);
    }

    if idempotency_key
        .as_ref()
        .is_some_and(|key| key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN)
    {
        return Err(PayloadError::IdempotencyKeyTooLong);
    }

    if payload.credentials.is_empty() && payload.credentials_text.is_none() {
        return Err(PayloadError::MissingCredentials);
    }
    if payload.messages.is_empty() && payload.messages_text.is_none() {
        return Err(PayloadError::MissingMessages);
    }

    let mut credentials = payload.credentials;
    if let Some(text) = &payload.credentials_text {
        credentials.extend(split_lines(text));
    }
    let mut messages = payload.messages;
    if let Some(text) = &payload.messages_text {
        messages.extend(split_lines(text));
    }

    Ok(TaskRequest {
        tenant,
        credentials,
        target_id: payload.target_id,
        messages,
        delay_secs: payload.delay_secs,
        idempotency_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> SubmitTaskRequest {
        SubmitTaskRequest {
            credentials: vec!["token-a".to_string()],
            target_id: "123_456".to_string(),
            messages: vec!["hello".to_string()],
            ..SubmitTaskRequest::default()
        }
    }

    #[test]
    fn test_build_merges_list_and_text_inputs() {
        let mut payload = payload();
        payload.messages_text = Some("second\n\nthird\n".to_string());
        payload.credentials_text = Some("token-b\ntoken-c".to_string());

        let request = build_task_request(payload, Some("crawler-a".into()), None).unwrap();
        assert_eq!(request.messages, vec!["hello", "second", "third"]);
        assert_eq!(request.credentials, vec!["token-a", "token-b", "token-c"]);
        assert_eq!(request.tenant, "crawler-a");
    }

    #[test]
    fn test_build_defaults_missing_tenant_to_empty() {
        let request = build_task_request(payload(), None, None).unwrap();
        assert_eq!(request.tenant, "");
    }

    #[test]
    fn test_build_rejects_bad_tenant() {
        let err = build_task_request(payload(), Some("a b".into()), None).unwrap_err();
        assert_eq!(err, PayloadError::InvalidTenant);

        let err = build_task_request(payload(), Some("x".repeat(65)), None).unwrap_err();
        assert_eq!(err, PayloadError::TenantTooLong);
    }

    #[test]
    fn test_build_requires_messages_and_credentials() {
        let mut no_messages = payload();
        no_messages.messages.clear();
        assert_eq!(
            build_task_request(no_messages, None, None).unwrap_err(),
            PayloadError::MissingMessages
        );

        let mut no_credentials = payload();
        no_credentials.credentials.clear();
        assert_eq!(
            build_task_request(no_credentials, None, None).unwrap_err(),
            PayloadError::MissingCredentials
        );
    }

    #[test]
    fn test_build_limits_idempotency_key() {
        let err = build_task_request(payload(), None, Some("k".repeat(129))).unwrap_err();
        assert_eq!(err, PayloadError::IdempotencyKeyTooLong);
    }
}
