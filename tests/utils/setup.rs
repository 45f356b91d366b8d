use std::sync::Arc;
use std::time::Duration;

use userstats::{
    config::ExecutionEnvironment,
    stats::{
        counters::{Collection, InMemoryCountStore, Record},
        identity::InMemoryIdentityStore,
        models::UserIdentity,
        rating::InMemoryRatingService,
        StatsBatchScheduler, StatsRecalculator, UserStatsUpdater,
    },
    tasks::{InMemoryTaskQueue, TaskDispatcher, TaskWorker, WorkerConfig},
};

use super::mocks::{FlakyCountStore, FlakyScheduler, RecordingStatsRepository};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub queue: Arc<InMemoryTaskQueue>,
    pub scheduler: Arc<FlakyScheduler>,
    pub records: Arc<InMemoryCountStore>,
    pub counts: Arc<FlakyCountStore>,
    pub ratings: Arc<InMemoryRatingService>,
    pub repository: Arc<RecordingStatsRepository>,
    pub batch: Arc<StatsBatchScheduler>,
    pub updater: Arc<UserStatsUpdater>,
    pub worker: TaskWorker,
}

impl TestSetup {
    /// Runs the worker until the queue has nothing pending or in flight
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        for _ in 0..1_000 {
            if self.queue.is_idle().await {
                return processed;
            }
            processed += self.worker.run_once().await.expect("worker poll should succeed");
        }
        panic!("queue did not drain");
    }

    pub async fn add_phase(&self, ready: &[&str], active: &[&str], missed: &[&str]) {
        self.records
            .insert(
                Collection::PhaseResults,
                Record::new()
                    .with_list("ready_users", ready.iter().copied())
                    .with_list("active_users", active.iter().copied())
                    .with_list("missed_users", missed.iter().copied()),
            )
            .await;
    }

    pub async fn add_started_game(&self, members: &[&str], finished: bool) {
        self.records
            .insert(
                Collection::Games,
                Record::new()
                    .with_list("member_ids", members.iter().copied())
                    .with_bool("started", true)
                    .with_bool("finished", finished),
            )
            .await;
    }
}

pub struct TestSetupBuilder {
    users: Vec<String>,
    environment: ExecutionEnvironment,
    max_attempts: u32,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            users: vec![],
            environment: ExecutionEnvironment::Test,
            max_attempts: 5,
        }
    }

    pub fn with_users(mut self, users: Vec<&str>) -> Self {
        self.users = users.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_three_users(self) -> Self {
        self.with_users(vec!["alice", "bob", "charlie"])
    }

    pub fn with_environment(mut self, environment: ExecutionEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub async fn build(self) -> TestSetup {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let scheduler = Arc::new(FlakyScheduler::new(queue.clone()));
        let records = Arc::new(InMemoryCountStore::new());
        let counts = Arc::new(FlakyCountStore::new(records.clone()));
        let ratings = Arc::new(InMemoryRatingService::new());
        let identities = Arc::new(InMemoryIdentityStore::new());
        let repository = Arc::new(RecordingStatsRepository::new());

        for user in &self.users {
            identities
                .insert(UserIdentity {
                    id: user.clone(),
                    name: user.to_uppercase(),
                    email: format!("{}@example.com", user),
                    ..UserIdentity::default()
                })
                .await;
        }

        let batch = Arc::new(StatsBatchScheduler::new(
            scheduler.clone(),
            self.environment,
        ));
        let updater = Arc::new(UserStatsUpdater::new(
            StatsRecalculator::new(counts.clone()),
            ratings.clone(),
            identities,
            repository.clone(),
        ));

        let dispatcher = Arc::new(
            TaskDispatcher::builder()
                .with_handler(batch.clone())
                .with_handler(updater.clone())
                .with_handler_timeout(Duration::from_secs(5))
                .build(),
        );
        let worker = TaskWorker::new(
            queue.clone(),
            dispatcher,
            WorkerConfig {
                poll_interval: Duration::from_millis(1),
                batch_size: 8,
                max_attempts: self.max_attempts,
                retry_base_delay: Duration::ZERO,
            },
        );

        TestSetup {
            queue,
            scheduler,
            records,
            counts,
            ratings,
            repository,
            batch,
            updater,
            worker,
        }
    }
}
