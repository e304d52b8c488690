//! Task dispatch
//!
//! [`Dispatcher::submit`] normalizes a request, registers a `pending` record and
//! spawns a detached [`TaskRunner`] for it; the caller gets the task id back
//! immediately and follows progress through the registry. Each runner is watched
//! by a supervising task so an error or panic inside the runner still ends with a
//! `failed` record instead of a task stuck in `running`.

pub mod input;
pub mod pool;
pub mod runner;

pub use input::{InputLimits, PreparedRequest, RequestError, TaskRequest, prepare, split_lines};
pub use pool::{CredentialPool, PoolMember};
pub use runner::{RunnerDeps, RunnerError, RunnerJob, RunnerSettings, TaskRunner};

use std::any::Any;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::graph::{CredentialValidator, DeliveryClient};
use crate::observability::Metrics;
use crate::registry::{
    CancelOutcome, NewTask, Registration, RegistryError, TaskListing, TaskRegistry,
    TaskSnapshot, TaskStatus,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("too many running tasks (limit {0})")]
    TooManyTasks(usize),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("registry error: {0}")]
    Registry(RegistryError),
}

impl From<RegistryError> for DispatchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::TaskNotFound(id) => DispatchError::NotFound(id),
            RegistryError::CapacityReached(limit) => DispatchError::TooManyTasks(limit),
            other => DispatchError::Registry(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Returned by [`Dispatcher::submit`]
#[derive(Debug, Clone, Serialize)]
pub struct TaskAccepted {
    pub task_id: String,
    pub credential_count: usize,
    pub message_count: usize,
    /// `true` when an idempotency key matched an earlier submission
    pub existing: bool,
}

/// Dispatch tunables derived from [`Config`]
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub limits: InputLimits,
    pub max_running_tasks: Option<usize>,
    pub preview_chars: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            limits: InputLimits::from(config),
            max_running_tasks: config.dispatch.max_running_tasks,
            preview_chars: config.dispatch.preview_chars,
        }
    }
}

/// Front door for submitting, querying and cancelling tasks
#[derive(Clone)]
pub struct Dispatcher {
    deps: RunnerDeps,
    settings: Arc<DispatchSettings>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TaskRegistry>,
        validator: Arc<dyn CredentialValidator>,
        delivery: Arc<dyn DeliveryClient>,
        metrics: Arc<Metrics>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            deps: RunnerDeps {
                registry,
                validator,
                delivery,
                metrics,
            },
            settings: Arc::new(settings),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.deps.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.deps.metrics
    }

    /// Register the task and start its runner. Returns without waiting for any
    /// validation or delivery.
    pub async fn submit(&self, request: TaskRequest) -> Result<TaskAccepted> {
        let prepared = prepare(request, &self.settings.limits)?;

        let registration = self
            .deps
            .registry
            .create(
                NewTask {
                    tenant: prepared.tenant.clone(),
                    target_id: prepared.target_id.clone(),
                    total_messages: prepared.messages.len(),
                    credential_count: prepared.credentials.len(),
                    delay_secs: prepared.delay_secs,
                    idempotency_key: prepared.idempotency_key.clone(),
                },
                self.settings.max_running_tasks,
            )
            .await?;

        let (snapshot, cancel) = match registration {
            Registration::Existing(snapshot) => {
                return Ok(TaskAccepted {
                    task_id: snapshot.id,
                    credential_count: snapshot.credential_count,
                    message_count: snapshot.total_messages,
                    existing: true,
                });
            }
            Registration::Created { snapshot, cancel } => (snapshot, cancel),
        };

        self.deps.metrics.task_accepted();
        info!(
            task_id = %snapshot.id,
            tenant = %snapshot.tenant,
            target_id = %snapshot.target_id,
            credentials = prepared.credentials.len(),
            messages = prepared.messages.len(),
            delay_secs = prepared.delay_secs,
            "Task accepted"
        );

        let settings = RunnerSettings {
            delay: prepared.delay(),
            preview_chars: self.settings.preview_chars,
        };
        let job = RunnerJob {
            task_id: snapshot.id.clone(),
            target_id: prepared.target_id,
            credentials: prepared.credentials,
            messages: prepared.messages,
        };
        let runner = TaskRunner::new(job, settings, self.deps.clone(), cancel);
        supervise(
            snapshot.id.clone(),
            self.deps.clone(),
            tokio::spawn(runner.run()),
        );

        Ok(TaskAccepted {
            task_id: snapshot.id,
            credential_count: snapshot.credential_count,
            message_count: snapshot.total_messages,
            existing: false,
        })
    }

    pub async fn status(&self, task_id: &str) -> Result<TaskSnapshot> {
        self.deps
            .registry
            .get(task_id)
            .await
            .ok_or_else(|| DispatchError::NotFound(task_id.to_string()))
    }

    pub async fn cancel(&self, task_id: &str) -> Result<CancelOutcome> {
        Ok(self.deps.registry.request_cancel(task_id).await?)
    }

    pub async fn list(&self, tenant: Option<&str>) -> TaskListing {
        self.deps.registry.list(tenant).await
    }

    /// Flag every unfinished task for cancellation
    pub async fn cancel_all(&self) -> usize {
        self.deps.registry.cancel_all().await
    }
}

/// Watch a runner and turn an error or panic into a `failed` record
fn supervise(
    task_id: String,
    deps: RunnerDeps,
    handle: JoinHandle<std::result::Result<TaskStatus, RunnerError>>,
) {
    tokio::spawn(async move {
        let fault = match handle.await {
            Ok(Ok(_)) => return,
            Ok(Err(err)) => err.to_string(),
            Err(join_err) if join_err.is_panic() => panic_message(join_err.into_panic()),
            Err(join_err) => join_err.to_string(),
        };

        error!(task_id = %task_id, fault = %fault, "Task runner faulted");
        let reason = format!("internal fault: {fault}");
        let result = deps
            .registry
            .update(&task_id, |task| {
                task.status = TaskStatus::Failed;
                task.last_error = Some(reason.clone());
                task.current_message = format!("Failed: {reason}");
                task.summary = Some(format!(
                    "Failed: {reason} after {}/{} sent",
                    task.sent_count, task.total_messages
                ));
                task.ended_at = Some(Utc::now());
            })
            .await;

        match result {
            Ok(_) => deps.metrics.task_failed(),
            Err(err) => error!(task_id = %task_id, error = %err, "Could not record runner fault"),
        }
    });
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "runner panicked".to_string()
    }
}
