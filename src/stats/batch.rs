use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use super::StatsError;
use crate::config::ExecutionEnvironment;
use crate::tasks::{EnqueueTransaction, Task, TaskError, TaskHandler, TaskKind, TaskScheduler};

/// Default delay before a requested stats update starts outside local
/// environments, so rapid successive triggers collapse into fewer runs
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

/// Entry point and chain scheduler for batched stats updates
///
/// A batch is never processed in one go. Each chain step schedules the update
/// for the head id and a new chain step for the tail, so every step does a
/// bounded amount of work and a failure only affects the unprocessed tail.
pub struct StatsBatchScheduler {
    scheduler: Arc<dyn TaskScheduler>,
    environment: ExecutionEnvironment,
    debounce: Duration,
}

impl StatsBatchScheduler {
    pub fn new(scheduler: Arc<dyn TaskScheduler>, environment: ExecutionEnvironment) -> Self {
        Self {
            scheduler,
            environment,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Delay applied to the first chain step
    pub fn enqueue_delay(&self) -> Duration {
        if self.environment.is_local() {
            Duration::ZERO
        } else {
            self.debounce
        }
    }

    /// Requests a stats refresh for `user_ids`
    ///
    /// An empty list schedules nothing. Duplicate ids are processed
    /// independently. On error nothing was scheduled.
    #[instrument(skip(self, user_ids), fields(count = user_ids.len()))]
    pub async fn schedule_stats_update(&self, user_ids: Vec<String>) -> Result<(), StatsError> {
        if user_ids.is_empty() {
            return Ok(());
        }

        let delay = self.enqueue_delay();
        self.scheduler
            .schedule(Task::RecalculateBatch { user_ids }, delay)
            .await
            .map_err(|e| {
                error!(error = %e, "Unable to schedule stats update");
                StatsError::Scheduling(e)
            })?;

        info!(delay_secs = delay.as_secs(), "Stats update scheduled");
        Ok(())
    }

    /// Schedules the head update and the tail continuation atomically
    #[instrument(skip(self, user_ids), fields(head = user_ids.first().map(String::as_str), remaining = user_ids.len()))]
    pub async fn process_batch(&self, user_ids: &[String]) -> Result<(), StatsError> {
        let Some((head, tail)) = user_ids.split_first() else {
            return Ok(());
        };

        let mut transaction = EnqueueTransaction::new();
        transaction.schedule(
            Task::RecalculateUser {
                user_id: head.clone(),
            },
            Duration::ZERO,
        );
        if !tail.is_empty() {
            transaction.schedule(
                Task::RecalculateBatch {
                    user_ids: tail.to_vec(),
                },
                Duration::ZERO,
            );
        }

        self.scheduler.commit(transaction).await.map_err(|e| {
            error!(error = %e, "Unable to commit stats batch step");
            StatsError::Scheduling(e)
        })?;

        info!(tail = tail.len(), "Stats batch step scheduled");
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for StatsBatchScheduler {
    fn kind(&self) -> TaskKind {
        TaskKind::RecalculateBatch
    }

    async fn run(&self, task: &Task) -> Result<(), TaskError> {
        match task {
            Task::RecalculateBatch { user_ids } => {
                self.process_batch(user_ids).await?;
                Ok(())
            }
            other => Err(TaskError::Mismatch {
                expected: TaskKind::RecalculateBatch,
                actual: other.kind(),
            }),
        }
    }
}
