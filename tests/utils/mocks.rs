use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use userstats::{
    stats::{
        counters::{CountQuery, CountStore, InMemoryCountStore},
        InMemoryStatsRepository, StatsError, StatsRepository, UserStats,
    },
    tasks::{EnqueueTransaction, InMemoryTaskQueue, TaskError, TaskScheduler},
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Scheduler that rejects the next `n` commits, then forwards to the queue
pub struct FlakyScheduler {
    queue: Arc<InMemoryTaskQueue>,
    failures_left: AtomicU32,
    rejected: AtomicU32,
}

impl FlakyScheduler {
    pub fn new(queue: Arc<InMemoryTaskQueue>) -> Self {
        Self {
            queue,
            failures_left: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
        }
    }

    pub fn fail_next_commits(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn rejected(&self) -> u32 {
        self.rejected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskScheduler for FlakyScheduler {
    async fn commit(&self, transaction: EnqueueTransaction) -> Result<(), TaskError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(TaskError::scheduling("simulated commit failure"));
        }
        self.queue.commit(transaction).await
    }
}

/// Count store that fails the next `n` queries, then reads the inner store
pub struct FlakyCountStore {
    inner: Arc<InMemoryCountStore>,
    failures_left: AtomicU32,
}

impl FlakyCountStore {
    pub fn new(inner: Arc<InMemoryCountStore>) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(0),
        }
    }

    pub fn fail_next_queries(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl CountStore for FlakyCountStore {
    async fn count(&self, query: &CountQuery) -> Result<u64, StatsError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StatsError::Query("simulated query failure".to_string()));
        }
        self.inner.count(query).await
    }
}

/// Stats repository that remembers every write per user
#[derive(Default)]
pub struct RecordingStatsRepository {
    inner: InMemoryStatsRepository,
    writes: RwLock<HashMap<String, Vec<UserStats>>>,
}

impl RecordingStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn writes_for(&self, user_id: &str) -> Vec<UserStats> {
        self.writes
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn write_counts(&self) -> HashMap<String, usize> {
        self.writes
            .read()
            .await
            .iter()
            .map(|(id, writes)| (id.clone(), writes.len()))
            .collect()
    }
}

#[async_trait]
impl StatsRepository for RecordingStatsRepository {
    async fn get_stats(&self, user_id: &str) -> Result<Option<UserStats>, StatsError> {
        self.inner.get_stats(user_id).await
    }

    async fn upsert_stats(&self, stats: &UserStats) -> Result<(), StatsError> {
        self.inner.upsert_stats(stats).await?;
        self.writes
            .write()
            .await
            .entry(stats.user_id.clone())
            .or_default()
            .push(stats.clone());
        Ok(())
    }

    async fn list_stats(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserStats>, StatsError> {
        self.inner.list_stats(after, limit).await
    }
}
