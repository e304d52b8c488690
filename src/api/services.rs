use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use super::{
    error::ApiError,
    models::{CancelResponse, HealthResponse, ListQuery, SubmitTaskRequest, TaskAcceptedResponse},
    state::AppState,
    utils::{IDEMPOTENCY_HEADER, TENANT_HEADER, header_value, require_json},
    validation::build_task_request,
};

/// Task submission endpoint (POST /tasks)
///
/// ## Flow:
/// 1. Require `application/json` (gzip bodies are decompressed by middleware)
/// 2. Read the body and enforce `server.api.max_payload_bytes`
/// 3. Merge list and text inputs, attach tenant and idempotency key from headers
/// 4. Hand off to the dispatcher, which normalizes, registers and spawns the runner
/// 5. Return 202 Accepted with the task id
///
/// A repeated `X-Dispatchbox-Idempotency-Key` for the same tenant returns the
/// earlier task with `existing: true` instead of starting a second run.
pub async fn submit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    require_json(&headers)?;

    let max_size = state.config.server.api.max_payload_bytes.as_usize();
    let body_bytes = read_body(body, max_size).await?;
    let payload: SubmitTaskRequest = serde_json::from_slice(&body_bytes)?;

    let request = build_task_request(
        payload,
        header_value(&headers, TENANT_HEADER),
        header_value(&headers, IDEMPOTENCY_HEADER),
    )?;

    let accepted = state.dispatcher.submit(request).await?;

    let response = TaskAcceptedResponse {
        task_id: accepted.task_id,
        credential_count: accepted.credential_count,
        message_count: accepted.message_count,
        existing: accepted.existing,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Collect at most `max_size` bytes of the (decompressed) body; stop reading as
/// soon as the limit is crossed
async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let collected = Limited::new(body, max_size).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            ApiError::PayloadTooLarge(max_size)
        } else {
            ApiError::Internal(err.to_string())
        }
    })?;

    Ok(collected.to_bytes().to_vec())
}

/// Task status endpoint (GET /tasks/{task_id})
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.dispatcher.status(&task_id).await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

/// Task listing (GET /tasks), oldest first, split into running and finished
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let tenant = query.tenant.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let listing = state.dispatcher.list(tenant).await;
    (StatusCode::OK, Json(listing))
}

/// Cancellation endpoint (POST /tasks/{task_id}/cancel)
///
/// Idempotent. The runner notices the request before its next delivery attempt
/// or while waiting between messages.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.dispatcher.cancel(&task_id).await?;
    Ok((StatusCode::OK, Json(CancelResponse { task_id, outcome })))
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        running_tasks: state.dispatcher.registry().running_count().await,
        metrics: state.dispatcher.metrics().snapshot(),
    };

    (StatusCode::OK, Json(response))
}
