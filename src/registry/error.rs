use thiserror::Error;

use super::models::TaskStatus;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {id}: invalid status transition {from:?} -> {to:?}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task {id} is already {status:?} and cannot be modified")]
    TaskFinished { id: String, status: TaskStatus },

    #[error("Task {id}: sent ({sent}) + failed ({failed}) exceeds total ({total})")]
    CountOverflow {
        id: String,
        sent: usize,
        failed: usize,
        total: usize,
    },

    #[error("Task {0}: sent/failed counters cannot decrease")]
    CountRegression(String),

    #[error("Task {0}: immutable field changed")]
    ImmutableField(String),

    #[error("Running task limit reached ({0})")]
    CapacityReached(usize),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
