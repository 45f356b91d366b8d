use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{
    identity::IdentityStore, models::UserStats, rating::RatingService,
    recalculator::StatsRecalculator, repository::StatsRepository, StatsError,
};
use crate::tasks::{Task, TaskError, TaskHandler, TaskKind};

/// Recalculates and persists the statistics of one user
///
/// The record is only written after every step succeeded. It never reads the
/// previously stored record, so running it twice for the same user, or
/// concurrently, leaves whichever complete record was written last.
pub struct UserStatsUpdater {
    recalculator: StatsRecalculator,
    ratings: Arc<dyn RatingService>,
    identities: Arc<dyn IdentityStore>,
    repository: Arc<dyn StatsRepository>,
}

impl UserStatsUpdater {
    pub fn new(
        recalculator: StatsRecalculator,
        ratings: Arc<dyn RatingService>,
        identities: Arc<dyn IdentityStore>,
        repository: Arc<dyn StatsRepository>,
    ) -> Self {
        Self {
            recalculator,
            ratings,
            identities,
            repository,
        }
    }

    #[instrument(skip(self))]
    pub async fn update_one_user(&self, user_id: &str) -> Result<UserStats, StatsError> {
        info!("Updating user stats");

        let stats = self.recalculator.recalculate(user_id).await.map_err(|e| {
            error!(error = %e, "Unable to recalculate user stats");
            e
        })?;

        let rating = self.ratings.current_rating(user_id).await.map_err(|e| {
            error!(error = %e, "Unable to fetch current rating");
            e
        })?;

        let identity = self.identities.get_identity(user_id).await.map_err(|e| {
            error!(error = %e, "Unable to load user identity");
            e
        })?;

        let stats = stats.with_rating(rating).with_identity(identity);
        self.repository.upsert_stats(&stats).await.map_err(|e| {
            error!(error = %e, "Unable to store user stats");
            e
        })?;

        info!(
            started_games = stats.counts.started_games,
            reliability = stats.metrics.reliability,
            "User stats updated"
        );
        Ok(stats)
    }
}

#[async_trait]
impl TaskHandler for UserStatsUpdater {
    fn kind(&self) -> TaskKind {
        TaskKind::RecalculateUser
    }

    async fn run(&self, task: &Task) -> Result<(), TaskError> {
        match task {
            Task::RecalculateUser { user_id } => {
                self.update_one_user(user_id).await?;
                Ok(())
            }
            other => Err(TaskError::Mismatch {
                expected: TaskKind::RecalculateUser,
                actual: other.kind(),
            }),
        }
    }
}
