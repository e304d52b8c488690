//! Task runner - drives one dispatch task from validation to a terminal state

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::pool::{CredentialPool, PoolMember};
use crate::graph::{Credential, CredentialValidator, DeliveryClient, DeliveryOutcome};
use crate::observability::Metrics;
use crate::registry::{
    CredentialIdentity, CredentialRejection, RegistryError, TaskRegistry, TaskStatus,
};

pub const NO_VALID_CREDENTIALS: &str = "no valid credentials";
pub const ALL_CREDENTIALS_EXHAUSTED: &str = "all credentials exhausted";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("registry update failed: {0}")]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Per-task runner settings
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Pause between consecutive messages
    pub delay: Duration,
    /// Characters of the message shown in `current_message`
    pub preview_chars: usize,
}

/// What to send, resolved before the runner starts
#[derive(Debug, Clone)]
pub struct RunnerJob {
    pub task_id: String,
    pub target_id: String,
    pub credentials: Vec<Credential>,
    pub messages: Vec<String>,
}

/// Collaborators shared by all runners
#[derive(Clone)]
pub struct RunnerDeps {
    pub registry: Arc<TaskRegistry>,
    pub validator: Arc<dyn CredentialValidator>,
    pub delivery: Arc<dyn DeliveryClient>,
    pub metrics: Arc<Metrics>,
}

/// How a single message ended
#[derive(Debug)]
enum MessageOutcome {
    Delivered,
    Undelivered { last_error: String },
    Cancelled,
}

/// Why the message loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunExit {
    Finished,
    Exhausted,
    Cancelled,
}

pub struct TaskRunner {
    job: RunnerJob,
    settings: RunnerSettings,
    deps: RunnerDeps,
    cancel: CancellationToken,
}

impl TaskRunner {
    pub fn new(
        job: RunnerJob,
        settings: RunnerSettings,
        deps: RunnerDeps,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job,
            settings,
            deps,
            cancel,
        }
    }

    /// Run the task to a terminal state and return that state.
    ///
    /// Per-credential and per-message failures are recorded on the task and never
    /// surface here; `Err` means the registry refused an update.
    pub async fn run(self) -> Result<TaskStatus> {
        let task_id = self.job.task_id.clone();
        info!(
            task_id = %task_id,
            target_id = %self.job.target_id,
            credentials = self.job.credentials.len(),
            "Task started"
        );

        self.deps
            .registry
            .update(&task_id, |task| {
                task.status = TaskStatus::Validating;
                task.started_at = Some(Utc::now());
                task.current_message = "Validating credentials".to_string();
            })
            .await?;

        let mut pool = self.validate_credentials().await?;

        if pool.is_empty() {
            warn!(task_id = %task_id, "No valid credentials, task failed");
            self.deps.metrics.task_failed();
            let snapshot = self
                .deps
                .registry
                .update(&task_id, |task| {
                    let summary = format!(
                        "Failed: {} ({} rejected)",
                        NO_VALID_CREDENTIALS,
                        task.rejected_credentials.len()
                    );
                    task.status = TaskStatus::Failed;
                    task.last_error = Some(NO_VALID_CREDENTIALS.to_string());
                    task.current_message = summary.clone();
                    task.summary = Some(summary);
                    task.ended_at = Some(Utc::now());
                })
                .await?;
            return Ok(snapshot.status);
        }

        let messages: Vec<String> = self
            .job
            .messages
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        let total = messages.len();
        let active = pool.usable_count();

        self.deps
            .registry
            .update(&task_id, |task| {
                task.status = TaskStatus::Running;
                task.total_messages = total;
                task.active_credential_count = active;
                task.current_message = "Starting...".to_string();
            })
            .await?;

        let exit = self.dispatch_messages(&mut pool, &messages).await?;
        self.finalize(exit).await
    }

    /// Validate every credential concurrently; order of results follows input order
    async fn validate_credentials(&self) -> Result<CredentialPool> {
        let checks = self
            .job
            .credentials
            .iter()
            .map(|credential| self.deps.validator.validate(credential));
        let results = join_all(checks).await;

        let mut members = Vec::new();
        let mut rejections = Vec::new();
        for (index, (credential, result)) in self.job.credentials.iter().zip(results).enumerate() {
            let position = index + 1;
            match result {
                Ok(identity) => {
                    debug!(task_id = %self.job.task_id, position, account = %identity.name, "Credential accepted");
                    members.push(PoolMember {
                        position,
                        credential: credential.clone(),
                        identity,
                    });
                }
                Err(failure) => {
                    warn!(task_id = %self.job.task_id, position, credential = %credential, reason = %failure, "Credential rejected");
                    rejections.push(CredentialRejection {
                        position,
                        credential: credential.masked(),
                        reason: failure.reason,
                    });
                }
            }
        }

        let identities: Vec<CredentialIdentity> = members
            .iter()
            .map(|m| CredentialIdentity {
                position: m.position,
                credential: m.credential.masked(),
                account_id: m.identity.id.clone(),
                account_name: m.identity.name.clone(),
            })
            .collect();
        let active = members.len();

        info!(
            task_id = %self.job.task_id,
            valid = active,
            rejected = rejections.len(),
            "Credential validation finished"
        );

        self.deps
            .registry
            .update(&self.job.task_id, |task| {
                task.identities = identities;
                task.rejected_credentials = rejections;
                task.active_credential_count = active;
            })
            .await?;

        Ok(CredentialPool::new(members))
    }

    /// Outer loop over messages
    async fn dispatch_messages(&self, pool: &mut CredentialPool, messages: &[String]) -> Result<RunExit> {
        let task_id = &self.job.task_id;
        let total = messages.len();

        for (index, message) in messages.iter().enumerate() {
            let number = index + 1;
            let status_line = format!(
                "Sending {}/{}: {}",
                number,
                total,
                preview(message, self.settings.preview_chars)
            );
            self.deps
                .registry
                .update(task_id, |task| task.current_message = status_line)
                .await?;

            let outcome = self.deliver_message(pool, message, number).await;
            let active = pool.usable_count();

            match outcome {
                MessageOutcome::Cancelled => {
                    // A credential may have expired earlier in this message
                    self.deps
                        .registry
                        .update(task_id, |task| task.active_credential_count = active)
                        .await?;
                    return Ok(RunExit::Cancelled);
                }
                MessageOutcome::Delivered => {
                    self.deps.metrics.message_sent();
                    self.deps
                        .registry
                        .update(task_id, |task| {
                            task.sent_count += 1;
                            task.active_credential_count = active;
                        })
                        .await?;
                }
                MessageOutcome::Undelivered { last_error } => {
                    warn!(task_id = %task_id, message_index = number, error = %last_error, "Message not delivered");
                    self.deps.metrics.message_failed();
                    self.deps
                        .registry
                        .update(task_id, |task| {
                            task.failed_count += 1;
                            task.last_error = Some(last_error);
                            task.active_credential_count = active;
                        })
                        .await?;
                }
            }

            if pool.is_exhausted() {
                warn!(task_id = %task_id, message_index = number, "All credentials exhausted");
                self.deps
                    .registry
                    .update(task_id, |task| {
                        task.last_error = Some(ALL_CREDENTIALS_EXHAUSTED.to_string())
                    })
                    .await?;
                return Ok(RunExit::Exhausted);
            }

            if self.cancel.is_cancelled() {
                return Ok(RunExit::Cancelled);
            }

            if number < total && self.pause().await {
                return Ok(RunExit::Cancelled);
            }
        }

        Ok(RunExit::Finished)
    }

    /// Inner loop over the live credential view for one message
    async fn deliver_message(&self, pool: &mut CredentialPool, message: &str, number: usize) -> MessageOutcome {
        let task_id = &self.job.task_id;
        let mut last_error = None;

        for credential in pool.live_view() {
            if self.cancel.is_cancelled() {
                return MessageOutcome::Cancelled;
            }

            let outcome = self
                .deps
                .delivery
                .deliver(&credential, &self.job.target_id, message)
                .await;

            match outcome {
                DeliveryOutcome::Delivered { comment_id } => {
                    info!(task_id = %task_id, message_index = number, credential = %credential, comment_id = %comment_id, "Message delivered");
                    return MessageOutcome::Delivered;
                }
                DeliveryOutcome::CredentialExpired { reason } => {
                    if pool.mark_expired(&credential) {
                        self.deps.metrics.credential_expired();
                    }
                    warn!(task_id = %task_id, message_index = number, credential = %credential, reason = %reason, "Credential expired, removed from pool");
                    last_error = Some(format!("credential {credential} expired: {reason}"));
                }
                DeliveryOutcome::PermissionDenied { reason } => {
                    debug!(task_id = %task_id, message_index = number, credential = %credential, reason = %reason, "Permission denied, trying next credential");
                    last_error = Some(format!("credential {credential} lacks permission: {reason}"));
                }
                DeliveryOutcome::OtherFailure { reason } => {
                    debug!(task_id = %task_id, message_index = number, credential = %credential, reason = %reason, "Delivery failed, trying next credential");
                    last_error = Some(format!("credential {credential}: {reason}"));
                }
            }
        }

        MessageOutcome::Undelivered {
            last_error: last_error.unwrap_or_else(|| ALL_CREDENTIALS_EXHAUSTED.to_string()),
        }
    }

    /// Sleep for the configured delay; returns `true` if cancelled meanwhile
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.delay) => false,
            _ = self.cancel.cancelled() => true,
        }
    }

    async fn finalize(&self, exit: RunExit) -> Result<TaskStatus> {
        let snapshot = self
            .deps
            .registry
            .update(&self.job.task_id, |task| {
                let (sent, total) = (task.sent_count, task.total_messages);
                let (status, summary) = match exit {
                    RunExit::Finished if sent > 0 => {
                        (TaskStatus::Completed, format!("Completed: {sent}/{total} sent"))
                    }
                    RunExit::Finished if total == 0 => {
                        (TaskStatus::Failed, "Failed: no messages to send".to_string())
                    }
                    RunExit::Finished => (
                        TaskStatus::Failed,
                        format!(
                            "Failed: 0/{total} sent, last error: {}",
                            task.last_error.as_deref().unwrap_or("unknown")
                        ),
                    ),
                    RunExit::Exhausted => (
                        TaskStatus::Failed,
                        format!("Failed: {ALL_CREDENTIALS_EXHAUSTED} after {sent}/{total} sent"),
                    ),
                    RunExit::Cancelled => {
                        (TaskStatus::Cancelled, format!("Cancelled: {sent}/{total} sent"))
                    }
                };
                task.status = status;
                task.current_message = summary.clone();
                task.summary = Some(summary);
                task.ended_at = Some(Utc::now());
            })
            .await?;

        match snapshot.status {
            TaskStatus::Completed => self.deps.metrics.task_completed(),
            TaskStatus::Cancelled => self.deps.metrics.task_cancelled(),
            _ => self.deps.metrics.task_failed(),
        }

        info!(
            task_id = %snapshot.id,
            status = ?snapshot.status,
            sent = snapshot.sent_count,
            failed = snapshot.failed_count,
            total = snapshot.total_messages,
            "Task finished"
        );
        Ok(snapshot.status)
    }
}

/// First `max_chars` characters, with an ellipsis when cut
fn preview(message: &str, max_chars: usize) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
