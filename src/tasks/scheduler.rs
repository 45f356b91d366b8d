use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{
    errors::TaskError,
    task::{ScheduledTask, Task},
};
use uuid::Uuid;

/// Tasks staged for a single all-or-nothing enqueue
///
/// Nothing is visible to workers until the transaction is handed to
/// [`TaskScheduler::commit`]. Dropping it discards every staged task.
#[derive(Debug, Default)]
pub struct EnqueueTransaction {
    staged: Vec<(Task, Duration)>,
}

impl EnqueueTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `task` to become due `delay` after commit
    pub fn schedule(&mut self, task: Task, delay: Duration) {
        self.staged.push((task, delay));
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Resolves every staged delay against `now`
    pub fn into_scheduled(self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, TaskError> {
        self.staged
            .into_iter()
            .map(|(task, delay)| {
                let delay = chrono::Duration::from_std(delay)
                    .map_err(|e| TaskError::scheduling(format!("invalid delay: {}", e)))?;
                Ok(ScheduledTask::new(task, now + delay))
            })
            .collect()
    }
}

/// Producer side of a deferred task queue
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Enqueues every staged task, or none of them on error
    async fn commit(&self, transaction: EnqueueTransaction) -> Result<(), TaskError>;

    /// Enqueues a single task
    async fn schedule(&self, task: Task, delay: Duration) -> Result<(), TaskError> {
        let mut transaction = EnqueueTransaction::new();
        transaction.schedule(task, delay);
        self.commit(transaction).await
    }
}

/// Consumer side of a deferred task queue
///
/// Delivery is at-least-once: a claimed task that is neither completed,
/// retried nor discarded may be delivered again.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Claims up to `limit` tasks whose `run_at` has passed, oldest first
    async fn claim_due(&self, limit: usize) -> Result<Vec<ScheduledTask>, TaskError>;

    /// Removes a successfully handled task
    async fn complete(&self, id: Uuid) -> Result<(), TaskError>;

    /// Puts a failed task back, due again after `delay`
    async fn retry(&self, task: ScheduledTask, delay: Duration, error: &str) -> Result<(), TaskError>;

    /// Drops a task that will not be retried
    async fn discard(&self, task: ScheduledTask, error: &str) -> Result<(), TaskError>;
}
