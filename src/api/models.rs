//! API models for the dispatchbox task endpoints.
//!
//! - `POST /tasks` accepts a [`SubmitTaskRequest`] and answers `202` with a
//!   [`TaskAcceptedResponse`]
//! - `GET /tasks/{id}` returns the task's [`TaskSnapshot`]
//! - `GET /tasks` returns a [`TaskListing`], optionally filtered with `?tenant=`
//! - `POST /tasks/{id}/cancel` returns a [`CancelResponse`]
//!
//! # Submission
//!
//! ```json
//! {
//!   "credentials": ["EAAB...", "EAAC..."],
//!   "target_id": "1234567890_987654321",
//!   "messages": ["first comment", "second comment"],
//!   "messages_text": "third comment\nfourth comment\n",
//!   "delay_secs": 10
//! }
//! ```
//!
//! `messages` and `messages_text` are concatenated in that order; blank lines are
//! dropped. `credentials_text` is accepted the same way for newline-separated
//! token lists. The tenant comes from the `X-Dispatchbox-Tenant` header.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;
use crate::registry::CancelOutcome;

pub use crate::registry::{TaskListing, TaskSnapshot};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubmitTaskRequest {
    #[serde(default)]
    pub credentials: Vec<String>,
    #[serde(default)]
    pub credentials_text: Option<String>,
    #[serde(default)]
    pub target_id: String,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub messages_text: Option<String>,
    #[serde(default)]
    pub delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAcceptedResponse {
    pub task_id: String,
    pub credential_count: usize,
    pub message_count: usize,
    pub existing: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub task_id: String,
    pub outcome: CancelOutcome,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub running_tasks: usize,
    pub metrics: MetricsSnapshot,
}
