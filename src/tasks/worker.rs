use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, instrument, warn};

use super::{
    dispatcher::TaskDispatcher,
    errors::TaskError,
    scheduler::TaskSource,
    task::ScheduledTask,
};

/// Configuration for the task worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to poll for due tasks
    pub poll_interval: Duration,
    /// Maximum tasks claimed per poll
    pub batch_size: usize,
    /// Deliveries before a failing task is discarded
    pub max_attempts: u32,
    /// Backoff before the first retry, doubled on each further failure
    pub retry_base_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 16,
            max_attempts: 10,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Exponential backoff with up to one base delay of random jitter
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_base_delay.as_millis() as u64;
        let backoff_ms = base_ms.saturating_mul(2_u64.saturating_pow(attempt.min(16)));
        let jitter_ms = rand::rng().random_range(0..=base_ms);
        Duration::from_millis(backoff_ms.saturating_add(jitter_ms))
    }
}

/// Claims due tasks and runs them through the dispatcher
pub struct TaskWorker {
    source: Arc<dyn TaskSource>,
    dispatcher: Arc<TaskDispatcher>,
    config: WorkerConfig,
}

impl TaskWorker {
    pub fn new(
        source: Arc<dyn TaskSource>,
        dispatcher: Arc<TaskDispatcher>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            source,
            dispatcher,
            config,
        }
    }

    /// Polls forever; meant to be spawned as a background task
    pub async fn run(self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "Starting task worker"
        );

        let mut poll_interval = interval(self.config.poll_interval);

        loop {
            poll_interval.tick().await;

            if let Err(e) = self.run_once().await {
                error!(error = %e, "Task worker poll failed");
            }
        }
    }

    /// Claims one batch of due tasks and runs them concurrently
    ///
    /// Returns how many tasks were claimed.
    pub async fn run_once(&self) -> Result<usize, TaskError> {
        let claimed = self.source.claim_due(self.config.batch_size).await?;
        let count = claimed.len();

        let outcomes = join_all(claimed.into_iter().map(|task| self.execute(task))).await;
        for outcome in outcomes {
            if let Err(e) = outcome {
                error!(error = %e, "Failed to settle task");
            }
        }

        Ok(count)
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, task_kind = %task.task.kind(), attempt = task.attempt))]
    async fn execute(&self, task: ScheduledTask) -> Result<(), TaskError> {
        match self.dispatcher.dispatch(&task.task).await {
            Ok(()) => self.source.complete(task.id).await,
            Err(e) if e.is_retryable() && task.attempt + 1 < self.config.max_attempts => {
                let delay = self.config.retry_delay(task.attempt);
                warn!(
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Task failed, will retry"
                );
                self.source.retry(task, delay, &e.to_string()).await
            }
            Err(e) => {
                error!(error = %e, "Task failed permanently");
                self.source.discard(task, &e.to_string()).await
            }
        }
    }
}
