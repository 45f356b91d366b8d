use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    errors::TaskError,
    scheduler::{EnqueueTransaction, TaskScheduler, TaskSource},
    task::ScheduledTask,
};

#[derive(Debug, Default)]
struct QueueState {
    pending: Vec<ScheduledTask>,
    in_flight: HashMap<Uuid, ScheduledTask>,
    discarded: Vec<(ScheduledTask, String)>,
}

/// In-memory task queue for development and testing
///
/// Commits are atomic because the whole transaction is appended under one
/// lock. Tasks are lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of tasks waiting to be claimed, oldest first
    pub async fn pending(&self) -> Vec<ScheduledTask> {
        let state = self.state.lock().await;
        let mut pending = state.pending.clone();
        pending.sort_by_key(|t| t.run_at);
        pending
    }

    /// Tasks dropped after exhausting their retries, with the last error
    pub async fn discarded(&self) -> Vec<(ScheduledTask, String)> {
        self.state.lock().await.discarded.clone()
    }

    /// True when nothing is pending or in flight
    pub async fn is_idle(&self) -> bool {
        let state = self.state.lock().await;
        state.pending.is_empty() && state.in_flight.is_empty()
    }
}

#[async_trait]
impl TaskScheduler for InMemoryTaskQueue {
    #[instrument(skip(self, transaction), fields(staged = transaction.len()))]
    async fn commit(&self, transaction: EnqueueTransaction) -> Result<(), TaskError> {
        let scheduled = transaction.into_scheduled(Utc::now())?;

        let mut state = self.state.lock().await;
        for task in &scheduled {
            debug!(task_id = %task.id, task_kind = %task.task.kind(), run_at = %task.run_at, "Task enqueued in memory");
        }
        state.pending.extend(scheduled);
        Ok(())
    }
}

#[async_trait]
impl TaskSource for InMemoryTaskQueue {
    async fn claim_due(&self, limit: usize) -> Result<Vec<ScheduledTask>, TaskError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let (mut due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|t| t.is_due(now));
        state.pending = waiting;

        due.sort_by_key(|t| t.run_at);
        if due.len() > limit {
            state.pending.extend(due.split_off(limit));
        }

        for task in &due {
            state.in_flight.insert(task.id, task.clone());
        }
        Ok(due)
    }

    async fn complete(&self, id: Uuid) -> Result<(), TaskError> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&id).is_none() {
            warn!(task_id = %id, "Completed task was not in flight");
        }
        Ok(())
    }

    async fn retry(
        &self,
        mut task: ScheduledTask,
        delay: Duration,
        error: &str,
    ) -> Result<(), TaskError> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| TaskError::scheduling(format!("invalid delay: {}", e)))?;

        let mut state = self.state.lock().await;
        state.in_flight.remove(&task.id);

        task.attempt += 1;
        task.run_at = Utc::now() + delay;
        debug!(task_id = %task.id, attempt = task.attempt, error = %error, "Task requeued in memory");
        state.pending.push(task);
        Ok(())
    }

    async fn discard(&self, task: ScheduledTask, error: &str) -> Result<(), TaskError> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&task.id);
        state.discarded.push((task, error.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Task;

    fn user_task(user_id: &str) -> Task {
        Task::RecalculateUser {
            user_id: user_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_makes_all_staged_tasks_pending() {
        let queue = InMemoryTaskQueue::new();
        let mut transaction = EnqueueTransaction::new();
        transaction.schedule(user_task("a"), Duration::ZERO);
        transaction.schedule(user_task("b"), Duration::ZERO);

        queue.commit(transaction).await.unwrap();

        assert_eq!(queue.pending().await.len(), 2);
    }

    #[tokio::test]
    async fn test_claim_skips_tasks_not_yet_due() {
        let queue = InMemoryTaskQueue::new();
        queue.schedule(user_task("now"), Duration::ZERO).await.unwrap();
        queue
            .schedule(user_task("later"), Duration::from_secs(10))
            .await
            .unwrap();

        let claimed = queue.claim_due(10).await.unwrap();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].task, user_task("now"));
        assert_eq!(queue.pending().await.len(), 1);
        assert!(!queue.is_idle().await);
    }

    #[tokio::test]
    async fn test_claim_respects_limit() {
        let queue = InMemoryTaskQueue::new();
        for id in ["a", "b", "c"] {
            queue.schedule(user_task(id), Duration::ZERO).await.unwrap();
        }

        let claimed = queue.claim_due(2).await.unwrap();

        assert_eq!(claimed.len(), 2);
        assert_eq!(queue.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_empties_queue() {
        let queue = InMemoryTaskQueue::new();
        queue.schedule(user_task("a"), Duration::ZERO).await.unwrap();

        let claimed = queue.claim_due(10).await.unwrap();
        queue.complete(claimed[0].id).await.unwrap();

        assert!(queue.is_idle().await);
    }

    #[tokio::test]
    async fn test_retry_increments_attempt_and_requeues() {
        let queue = InMemoryTaskQueue::new();
        queue.schedule(user_task("a"), Duration::ZERO).await.unwrap();

        let mut claimed = queue.claim_due(10).await.unwrap();
        let task = claimed.remove(0);
        let id = task.id;
        queue.retry(task, Duration::ZERO, "boom").await.unwrap();

        let reclaimed = queue.claim_due(10).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, id);
        assert_eq!(reclaimed[0].attempt, 1);
    }

    #[tokio::test]
    async fn test_discard_records_last_error() {
        let queue = InMemoryTaskQueue::new();
        queue.schedule(user_task("a"), Duration::ZERO).await.unwrap();

        let mut claimed = queue.claim_due(10).await.unwrap();
        queue.discard(claimed.remove(0), "gave up").await.unwrap();

        let discarded = queue.discarded().await;
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].1, "gave up");
        assert!(queue.is_idle().await);
    }
}
