use thiserror::Error;

use super::task::TaskKind;

/// Errors raised while scheduling or running deferred tasks
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No handler registered for task kind {0}")]
    Unhandled(TaskKind),

    #[error("Handler for {expected} received a {actual} task")]
    Mismatch { expected: TaskKind, actual: TaskKind },

    #[error("Task failed: {0}")]
    Failed(String),

    /// The task can never succeed, e.g. its payload carries an invalid id
    #[error("Task rejected: {0}")]
    Rejected(String),

    #[error("Task timed out")]
    Timeout,
}

impl TaskError {
    /// Whether redelivering the same task can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Scheduling(_) | TaskError::Failed(_) | TaskError::Timeout
        )
    }

    pub fn scheduling(msg: impl Into<String>) -> Self {
        TaskError::Scheduling(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::Failed(msg.into())
    }
}
