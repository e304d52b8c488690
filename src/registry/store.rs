use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{RegistryError, Result};
use super::models::{CancelOutcome, NewTask, TaskListing, TaskSnapshot, TaskStatus};
use super::pruning::{PruneStats, prune_finished};

pub(super) type IdempotencyKey = (String, String);

pub(super) struct TaskEntry {
    pub(super) snapshot: TaskSnapshot,
    pub(super) cancel: CancellationToken,
    pub(super) idempotency_key: Option<IdempotencyKey>,
}

#[derive(Default)]
pub(super) struct Inner {
    pub(super) tasks: HashMap<String, TaskEntry>,
    pub(super) idempotency: HashMap<IdempotencyKey, String>,
}

/// Outcome of [`TaskRegistry::create`]
#[derive(Debug, Clone)]
pub enum Registration {
    /// A new record; the caller owns the runner for it
    Created {
        snapshot: TaskSnapshot,
        cancel: CancellationToken,
    },
    /// The idempotency key already maps to this task
    Existing(TaskSnapshot),
}

/// In-memory store of task records shared by runners and status readers
///
/// Every mutation is applied to a copy of the record under the write lock,
/// checked, then committed, so readers only ever see whole records.
#[derive(Default)]
pub struct TaskRegistry {
    inner: RwLock<Inner>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id and insert a `pending` record.
    ///
    /// With `max_running` set, creation fails once that many tasks are unfinished.
    pub async fn create(&self, new: NewTask, max_running: Option<usize>) -> Result<Registration> {
        let mut inner = self.inner.write().await;

        let idempotency_key = new
            .idempotency_key
            .as_ref()
            .map(|key| (new.tenant.clone(), key.clone()));

        if let Some(key) = &idempotency_key {
            if let Some(entry) = inner
                .idempotency
                .get(key)
                .and_then(|task_id| inner.tasks.get(task_id))
            {
                debug!(task_id = %entry.snapshot.id, "Idempotency key matched existing task");
                return Ok(Registration::Existing(entry.snapshot.clone()));
            }
        }

        if let Some(limit) = max_running {
            let running = count_unfinished(&inner);
            if running >= limit {
                return Err(RegistryError::CapacityReached(limit));
            }
        }

        let mut id = Uuid::now_v7().to_string();
        while inner.tasks.contains_key(&id) {
            id = Uuid::now_v7().to_string();
        }

        let now = Utc::now();
        let snapshot = TaskSnapshot {
            id: id.clone(),
            tenant: new.tenant,
            target_id: new.target_id,
            status: TaskStatus::Pending,
            total_messages: new.total_messages,
            sent_count: 0,
            failed_count: 0,
            progress_percent: 0,
            credential_count: new.credential_count,
            active_credential_count: 0,
            identities: Vec::new(),
            rejected_credentials: Vec::new(),
            last_error: None,
            current_message: "Queued".to_string(),
            summary: None,
            stop_requested: false,
            delay_secs: new.delay_secs,
            created_at: now,
            started_at: None,
            ended_at: None,
            updated_at: now,
        };
        let cancel = CancellationToken::new();

        if let Some(key) = &idempotency_key {
            inner.idempotency.insert(key.clone(), id.clone());
        }
        inner.tasks.insert(
            id.clone(),
            TaskEntry {
                snapshot: snapshot.clone(),
                cancel: cancel.clone(),
                idempotency_key,
            },
        );

        info!(task_id = %id, tenant = %snapshot.tenant, "Task registered");
        Ok(Registration::Created { snapshot, cancel })
    }

    /// Apply `mutate` to the task as one atomic field-group update.
    ///
    /// Rejected (record unchanged) when the task is terminal, when status would
    /// move backwards, when identity fields change, or when counters would shrink
    /// or exceed `total_messages`. `progress_percent`, `updated_at` and, for
    /// terminal states, `ended_at` are maintained here.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<TaskSnapshot>
    where
        F: FnOnce(&mut TaskSnapshot),
    {
        let mut inner = self.inner.write().await;
        let entry = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| RegistryError::TaskNotFound(id.to_string()))?;

        let current = &entry.snapshot;
        if current.status.is_terminal() {
            return Err(RegistryError::TaskFinished {
                id: id.to_string(),
                status: current.status,
            });
        }

        let mut next = current.clone();
        mutate(&mut next);
        check_update(current, &next)?;

        // Only cancellation may touch the stop flag
        next.stop_requested = current.stop_requested;
        let now = Utc::now();
        if next.status.is_terminal() && next.ended_at.is_none() {
            next.ended_at = Some(now);
        }
        next.refresh_progress();
        next.updated_at = now;

        entry.snapshot = next.clone();
        Ok(next)
    }

    /// Status query
    pub async fn get(&self, id: &str) -> Option<TaskSnapshot> {
        self.inner
            .read()
            .await
            .tasks
            .get(id)
            .map(|entry| entry.snapshot.clone())
    }

    /// Set the stop-requested flag. Touches no other field.
    pub async fn request_cancel(&self, id: &str) -> Result<CancelOutcome> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| RegistryError::TaskNotFound(id.to_string()))?;

        if entry.snapshot.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyFinished);
        }
        if entry.snapshot.stop_requested {
            entry.cancel.cancel();
            return Ok(CancelOutcome::AlreadyRequested);
        }

        entry.snapshot.stop_requested = true;
        entry.cancel.cancel();
        info!(task_id = %id, "Cancellation requested");
        Ok(CancelOutcome::Requested)
    }

    /// Request cancellation of every unfinished task; returns how many were flagged
    pub async fn cancel_all(&self) -> usize {
        let mut inner = self.inner.write().await;
        let mut flagged = 0;
        for entry in inner.tasks.values_mut() {
            if !entry.snapshot.status.is_terminal() && !entry.snapshot.stop_requested {
                entry.snapshot.stop_requested = true;
                entry.cancel.cancel();
                flagged += 1;
            }
        }
        flagged
    }

    /// All tasks (optionally for one tenant), oldest first, split into running and finished
    pub async fn list(&self, tenant: Option<&str>) -> TaskListing {
        let inner = self.inner.read().await;
        let mut snapshots: Vec<TaskSnapshot> = inner
            .tasks
            .values()
            .filter(|entry| tenant.is_none_or(|t| entry.snapshot.tenant == t))
            .map(|entry| entry.snapshot.clone())
            .collect();
        drop(inner);

        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let (finished, running) = snapshots
            .into_iter()
            .partition(|snapshot| snapshot.status.is_terminal());
        TaskListing { running, finished }
    }

    pub async fn running_count(&self) -> usize {
        count_unfinished(&*self.inner.read().await)
    }

    /// Drop finished tasks that ended more than `ttl` ago
    pub async fn prune_finished(&self, ttl: Duration) -> PruneStats {
        let cutoff = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
        let Some(cutoff) = cutoff else {
            return PruneStats::default();
        };

        let mut inner = self.inner.write().await;
        prune_finished(&mut inner, cutoff)
    }
}

fn count_unfinished(inner: &Inner) -> usize {
    inner
        .tasks
        .values()
        .filter(|entry| !entry.snapshot.status.is_terminal())
        .count()
}

fn check_update(current: &TaskSnapshot, next: &TaskSnapshot) -> Result<()> {
    let id = &current.id;

    if next.id != current.id
        || next.tenant != current.tenant
        || next.target_id != current.target_id
        || next.created_at != current.created_at
    {
        return Err(RegistryError::ImmutableField(id.clone()));
    }

    if !current.status.can_transition_to(next.status) {
        return Err(RegistryError::InvalidTransition {
            id: id.clone(),
            from: current.status,
            to: next.status,
        });
    }

    if next.sent_count < current.sent_count || next.failed_count < current.failed_count {
        return Err(RegistryError::CountRegression(id.clone()));
    }

    if next.processed() > next.total_messages {
        return Err(RegistryError::CountOverflow {
            id: id.clone(),
            sent: next.sent_count,
            failed: next.failed_count,
            total: next.total_messages,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(total: usize) -> NewTask {
        NewTask {
            tenant: "default".to_string(),
            target_id: "post-1".to_string(),
            total_messages: total,
            credential_count: 2,
            delay_secs: 1,
            idempotency_key: None,
        }
    }

    async fn create(registry: &TaskRegistry, total: usize) -> TaskSnapshot {
        match registry.create(new_task(total), None).await.unwrap() {
            Registration::Created { snapshot, .. } => snapshot,
            Registration::Existing(_) => panic!("expected a new task"),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = TaskRegistry::new();
        let snapshot = create(&registry, 3).await;

        assert_eq!(snapshot.status, TaskStatus::Pending);
        assert!(snapshot.ended_at.is_none());

        let fetched = registry.get(&snapshot.id).await.unwrap();
        assert_eq!(fetched.id, snapshot.id);
        assert_eq!(fetched.total_messages, 3);
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let registry = TaskRegistry::new();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(ids.insert(create(&registry, 1).await.id));
        }
    }

    #[tokio::test]
    async fn test_update_recomputes_progress() {
        let registry = TaskRegistry::new();
        let id = create(&registry, 3).await.id;

        let updated = registry
            .update(&id, |task| {
                task.status = TaskStatus::Running;
                task.sent_count += 1;
            })
            .await
            .unwrap();

        assert_eq!(updated.progress_percent, 33);
        assert_eq!(registry.get(&id).await.unwrap().progress_percent, 33);
    }

    #[tokio::test]
    async fn test_update_rejects_overflow_and_leaves_record_intact() {
        let registry = TaskRegistry::new();
        let id = create(&registry, 1).await.id;

        let result = registry
            .update(&id, |task| {
                task.sent_count = 1;
                task.failed_count = 1;
            })
            .await;

        assert!(matches!(result, Err(RegistryError::CountOverflow { .. })));
        let snapshot = registry.get(&id).await.unwrap();
        assert_eq!(snapshot.processed(), 0);
    }

    #[tokio::test]
    async fn test_status_never_moves_backwards() {
        let registry = TaskRegistry::new();
        let id = create(&registry, 1).await.id;

        registry
            .update(&id, |task| task.status = TaskStatus::Running)
            .await
            .unwrap();
        let result = registry
            .update(&id, |task| task.status = TaskStatus::Validating)
            .await;
        assert!(matches!(result, Err(RegistryError::InvalidTransition { .. })));

        let finished = registry
            .update(&id, |task| task.status = TaskStatus::Completed)
            .await
            .unwrap();
        assert!(finished.ended_at.is_some());

        let result = registry
            .update(&id, |task| task.status = TaskStatus::Running)
            .await;
        assert!(matches!(result, Err(RegistryError::TaskFinished { .. })));
        assert_eq!(registry.get(&id).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_runner_cannot_clear_stop_flag() {
        let registry = TaskRegistry::new();
        let id = create(&registry, 2).await.id;

        registry.request_cancel(&id).await.unwrap();
        let snapshot = registry
            .update(&id, |task| task.stop_requested = false)
            .await
            .unwrap();
        assert!(snapshot.stop_requested);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_touches_only_the_flag() {
        let registry = TaskRegistry::new();
        let (id, token) = match registry.create(new_task(2), None).await.unwrap() {
            Registration::Created { snapshot, cancel } => (snapshot.id, cancel),
            Registration::Existing(_) => unreachable!(),
        };
        let before = registry.get(&id).await.unwrap();

        assert_eq!(registry.request_cancel(&id).await.unwrap(), CancelOutcome::Requested);
        assert_eq!(
            registry.request_cancel(&id).await.unwrap(),
            CancelOutcome::AlreadyRequested
        );
        assert!(token.is_cancelled());

        let after = registry.get(&id).await.unwrap();
        assert!(after.stop_requested);
        assert_eq!(after.status, before.status);
        assert_eq!(after.current_message, before.current_message);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn test_cancel_unknown_and_finished_tasks() {
        let registry = TaskRegistry::new();
        assert!(matches!(
            registry.request_cancel("nope").await,
            Err(RegistryError::TaskNotFound(_))
        ));

        let id = create(&registry, 1).await.id;
        registry
            .update(&id, |task| task.status = TaskStatus::Failed)
            .await
            .unwrap();
        assert_eq!(
            registry.request_cancel(&id).await.unwrap(),
            CancelOutcome::AlreadyFinished
        );
        assert!(!registry.get(&id).await.unwrap().stop_requested);
    }

    #[tokio::test]
    async fn test_list_partitions_and_filters_by_tenant() {
        let registry = TaskRegistry::new();
        let a = create(&registry, 1).await.id;
        let b = create(&registry, 1).await.id;
        registry
            .update(&b, |task| task.status = TaskStatus::Completed)
            .await
            .unwrap();

        let mut other = new_task(1);
        other.tenant = "acme".to_string();
        registry.create(other, None).await.unwrap();

        let listing = registry.list(None).await;
        assert_eq!(listing.running.len(), 2);
        assert_eq!(listing.finished.len(), 1);
        assert_eq!(listing.finished[0].id, b);

        let default_only = registry.list(Some("default")).await;
        assert_eq!(default_only.running.len(), 1);
        assert_eq!(default_only.running[0].id, a);
    }

    #[tokio::test]
    async fn test_idempotency_key_returns_existing_task() {
        let registry = TaskRegistry::new();
        let mut request = new_task(1);
        request.idempotency_key = Some("key-1".to_string());

        let first = match registry.create(request.clone(), None).await.unwrap() {
            Registration::Created { snapshot, .. } => snapshot,
            Registration::Existing(_) => panic!("first call must create"),
        };
        match registry.create(request.clone(), None).await.unwrap() {
            Registration::Existing(snapshot) => assert_eq!(snapshot.id, first.id),
            Registration::Created { .. } => panic!("second call must reuse"),
        }

        // Same key under another tenant is independent
        request.tenant = "acme".to_string();
        assert!(matches!(
            registry.create(request, None).await.unwrap(),
            Registration::Created { .. }
        ));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let registry = TaskRegistry::new();
        let id = create(&registry, 1).await.id;

        assert!(matches!(
            registry.create(new_task(1), Some(1)).await,
            Err(RegistryError::CapacityReached(1))
        ));

        registry
            .update(&id, |task| task.status = TaskStatus::Cancelled)
            .await
            .unwrap();
        assert!(registry.create(new_task(1), Some(1)).await.is_ok());
        assert_eq!(registry.running_count().await, 1);
    }

    #[tokio::test]
    async fn test_cancel_all_flags_unfinished_tasks() {
        let registry = TaskRegistry::new();
        create(&registry, 1).await;
        create(&registry, 1).await;
        let done = create(&registry, 1).await.id;
        registry
            .update(&done, |task| task.status = TaskStatus::Completed)
            .await
            .unwrap();

        assert_eq!(registry.cancel_all().await, 2);
        assert_eq!(registry.cancel_all().await, 0);
    }
}
