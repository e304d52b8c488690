use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a dispatch task. Variants are ordered; status never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Validating,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Allowed moves: forward through pending → validating → running, or from any
    /// non-terminal state into a terminal one. Staying put is always allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next.is_terminal() || next > self
    }
}

/// A credential that passed validation, with the account it resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialIdentity {
    /// 1-based position in the submitted credential list
    pub position: usize,
    pub credential: String,
    pub account_id: String,
    pub account_name: String,
}

/// A credential rejected before use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRejection {
    pub position: usize,
    pub credential: String,
    pub reason: String,
}

/// Full observable state of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub tenant: String,
    pub target_id: String,
    pub status: TaskStatus,
    pub total_messages: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub progress_percent: u8,
    pub credential_count: usize,
    pub active_credential_count: usize,
    pub identities: Vec<CredentialIdentity>,
    pub rejected_credentials: Vec<CredentialRejection>,
    pub last_error: Option<String>,
    pub current_message: String,
    pub summary: Option<String>,
    pub stop_requested: bool,
    pub delay_secs: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn processed(&self) -> usize {
        self.sent_count + self.failed_count
    }

    pub(crate) fn refresh_progress(&mut self) {
        self.progress_percent = progress_percent(self.processed(), self.total_messages);
    }
}

/// `floor(100 * processed / total)`, 0 for an empty task
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (processed.min(total) as u128 * 100) / total as u128;
    percent as u8
}

/// Initial values for a new task record
#[derive(Debug, Clone)]
pub struct NewTask {
    pub tenant: String,
    pub target_id: String,
    pub total_messages: usize,
    pub credential_count: usize,
    pub delay_secs: u64,
    pub idempotency_key: Option<String>,
}

/// All known tasks, split by whether they can still change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskListing {
    pub running: Vec<TaskSnapshot>,
    pub finished: Vec<TaskSnapshot>,
}

/// Result of a cancellation request on an existing task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Requested,
    AlreadyRequested,
    AlreadyFinished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_moves_forward_only() {
        use TaskStatus::*;

        assert!(Pending.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Running));

        assert!(!Running.can_transition_to(Validating));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Cancelled.can_transition_to(Failed));
    }

    #[test]
    fn test_progress_percent_floors() {
        assert_eq!(progress_percent(0, 3), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 66);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(0, 0), 0);
    }
}
