use futures::future::try_join_all;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, instrument};

use super::{
    counters::{CountStore, Counter},
    models::{StatCounts, UserStats},
    StatsError,
};

/// Produces a fresh statistics record from the counter query set
pub struct StatsRecalculator {
    counts: Arc<dyn CountStore>,
}

impl StatsRecalculator {
    pub fn new(counts: Arc<dyn CountStore>) -> Self {
        Self { counts }
    }

    /// Runs every counter for `user_id` and derives the ratios
    ///
    /// The counters run concurrently; the first failure aborts the whole
    /// recalculation and no record is produced.
    #[instrument(skip(self))]
    pub async fn recalculate(&self, user_id: &str) -> Result<UserStats, StatsError> {
        if user_id.is_empty() {
            return Err(StatsError::Validation("user id must not be empty".to_string()));
        }

        let results = try_join_all(Counter::iter().map(|counter| async move {
            let value = self.counts.count(&counter.query(user_id)).await?;
            Ok::<_, StatsError>((counter, value))
        }))
        .await?;

        let mut counts = StatCounts::default();
        for (counter, value) in results {
            counts.set(counter, value);
        }

        debug!(?counts, "Counters collected");
        Ok(UserStats::from_counts(user_id, counts))
    }
}
