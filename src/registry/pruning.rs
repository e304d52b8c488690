//! Retention of finished task records

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::store::Inner;

/// Pruning statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    pub tasks_pruned: usize,
    pub idempotency_pruned: usize,
}

/// Remove terminal tasks that ended before `cutoff`, with their idempotency keys.
/// Unfinished tasks are never pruned.
pub(super) fn prune_finished(inner: &mut Inner, cutoff: DateTime<Utc>) -> PruneStats {
    let expired: Vec<String> = inner
        .tasks
        .iter()
        .filter(|(_, entry)| {
            entry.snapshot.status.is_terminal()
                && entry.snapshot.ended_at.is_some_and(|ended| ended < cutoff)
        })
        .map(|(id, _)| id.clone())
        .collect();

    let mut stats = PruneStats::default();
    for id in expired {
        let Some(entry) = inner.tasks.remove(&id) else {
            continue;
        };
        stats.tasks_pruned += 1;
        debug!(task_id = %id, "Pruned finished task");

        if let Some(key) = entry.idempotency_key {
            if inner.idempotency.remove(&key).is_some() {
                stats.idempotency_pruned += 1;
            }
        }
    }

    if stats.tasks_pruned > 0 {
        info!(?stats, "Pruning complete");
    }
    stats
}
