/// In-memory task registry shared between task runners and status readers
///
/// Each task record is written by exactly one runner; any number of readers may
/// poll it concurrently, and the only external mutation is the stop-requested
/// flag set by cancellation. All writes go through [`TaskRegistry::update`],
/// which applies a closure to a copy of the record under the write lock and
/// commits it only if the record's invariants still hold:
///
/// - status moves forward only and a terminal record is frozen
/// - `sent_count + failed_count <= total_messages`
/// - `progress_percent` always matches the counters
///
/// ## Retention
///
/// Records are not persisted. Finished tasks are dropped by
/// [`TaskRegistry::prune_finished`] once they are older than the configured TTL;
/// the API server runs this on an interval.
///
/// ## Usage
///
/// ```rust,ignore
/// use dispatchbox::registry::{TaskRegistry, TaskStatus};
///
/// let registry = TaskRegistry::new();
/// let snapshot = registry.update(&task_id, |task| task.sent_count += 1).await?;
/// let listing = registry.list(None).await;
/// ```

pub mod error;
pub mod models;
pub mod pruning;
pub mod store;

pub use error::{RegistryError, Result};
pub use models::{
    CancelOutcome, CredentialIdentity, CredentialRejection, NewTask, TaskListing, TaskSnapshot,
    TaskStatus, progress_percent,
};
pub use pruning::PruneStats;
pub use store::{Registration, TaskRegistry};
