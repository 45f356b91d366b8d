use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::{models::RatingSnapshot, StatsError};

/// Source of the current skill rating for a user
///
/// Producing the rating is the rating system's job; this service only reads
/// the latest result. Users that were never rated get
/// [`RatingSnapshot::initial`].
#[async_trait]
pub trait RatingService: Send + Sync {
    async fn current_rating(&self, user_id: &str) -> Result<RatingSnapshot, StatsError>;
}

#[derive(Debug, Default)]
pub struct InMemoryRatingService {
    ratings: Arc<RwLock<HashMap<String, RatingSnapshot>>>,
}

impl InMemoryRatingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_rating(&self, user_id: &str, rating: RatingSnapshot) {
        self.ratings
            .write()
            .await
            .insert(user_id.to_string(), rating);
    }
}

#[async_trait]
impl RatingService for InMemoryRatingService {
    async fn current_rating(&self, user_id: &str) -> Result<RatingSnapshot, StatsError> {
        let ratings = self.ratings.read().await;
        Ok(ratings
            .get(user_id)
            .cloned()
            .unwrap_or_else(RatingSnapshot::initial))
    }
}

/// Reads the most recent row of the `ratings` table
pub struct PostgresRatingService {
    pool: PgPool,
}

impl PostgresRatingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RatingService for PostgresRatingService {
    #[instrument(skip(self))]
    async fn current_rating(&self, user_id: &str) -> Result<RatingSnapshot, StatsError> {
        let row = sqlx::query(
            "SELECT rating, deviation, volatility, created_at FROM ratings WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to fetch rating");
            StatsError::Rating(e.to_string())
        })?;

        let rating = match row {
            Some(row) => {
                let computed_at: DateTime<Utc> = row.get("created_at");
                RatingSnapshot {
                    rating: row.get("rating"),
                    deviation: row.get("deviation"),
                    volatility: row.get("volatility"),
                    computed_at: Some(computed_at),
                }
            }
            None => {
                debug!(user_id = %user_id, "No rating found, using initial rating");
                RatingSnapshot::initial()
            }
        };

        Ok(rating)
    }
}
