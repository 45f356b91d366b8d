use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{
    counters::Counter,
    derived::DerivedMetrics,
};

/// Skill rating snapshot copied from the rating service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RatingSnapshot {
    pub rating: f64,
    pub deviation: f64,
    pub volatility: f64,
    /// When the rating was computed; `None` for a user that was never rated
    pub computed_at: Option<DateTime<Utc>>,
}

impl RatingSnapshot {
    /// Rating assigned to users with no rated games
    pub fn initial() -> Self {
        Self {
            rating: 1500.0,
            deviation: 350.0,
            volatility: 0.06,
            computed_at: None,
        }
    }
}

impl Default for RatingSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}

/// Public identity of a user as held by the identity store
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    /// Private contact address, removed before the record is exposed
    pub email: String,
    pub picture: String,
    pub locale: String,
    pub verified_email: bool,
}

impl UserIdentity {
    pub fn scrub(&mut self) {
        self.email.clear();
    }
}

/// Raw counters gathered by the counter query set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatCounts {
    pub started_games: u64,
    pub finished_games: u64,
    pub solo_wins: u64,
    pub forced_draw_count: u64,
    pub eliminated_count: u64,
    pub dropped_count: u64,
    pub missed_turn_phases: u64,
    pub active_turn_phases: u64,
    pub ready_turn_phases: u64,
    pub owned_ban_count: u64,
    pub shared_ban_count: u64,
}

impl StatCounts {
    pub fn set(&mut self, counter: Counter, value: u64) {
        let slot = match counter {
            Counter::StartedGames => &mut self.started_games,
            Counter::FinishedGames => &mut self.finished_games,
            Counter::SoloWins => &mut self.solo_wins,
            Counter::ForcedDraws => &mut self.forced_draw_count,
            Counter::Eliminations => &mut self.eliminated_count,
            Counter::Drops => &mut self.dropped_count,
            Counter::MissedTurnPhases => &mut self.missed_turn_phases,
            Counter::ActiveTurnPhases => &mut self.active_turn_phases,
            Counter::ReadyTurnPhases => &mut self.ready_turn_phases,
            Counter::OwnedBans => &mut self.owned_ban_count,
            Counter::SharedBans => &mut self.shared_ban_count,
        };
        *slot = value;
    }
}

/// Aggregate statistics for one user, keyed by `user_id`
///
/// Every field is recomputed from scratch on each update and the record is
/// stored by full replacement. Nothing is incremented in place, which is what
/// makes redelivered or concurrent updates for the same user safe without
/// locking: the last complete write wins.
///
/// Missing fields deserialize to their empty values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    #[serde(default)]
    pub user_id: String,
    #[serde(flatten)]
    pub counts: StatCounts,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
    #[serde(default)]
    pub rating: RatingSnapshot,
    #[serde(default)]
    pub identity: UserIdentity,
}

impl UserStats {
    /// Builds a record from freshly counted values
    pub fn from_counts(user_id: impl Into<String>, counts: StatCounts) -> Self {
        Self {
            user_id: user_id.into(),
            metrics: DerivedMetrics::compute(&counts),
            counts,
            rating: RatingSnapshot::initial(),
            identity: UserIdentity::default(),
        }
    }

    /// Record for a user with no recorded activity
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self::from_counts(user_id, StatCounts::default())
    }

    pub fn with_rating(mut self, rating: RatingSnapshot) -> Self {
        self.rating = rating;
        self
    }

    pub fn with_identity(mut self, identity: UserIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Copy of the record that is safe to expose outside the service
    pub fn scrubbed(&self) -> Self {
        let mut stats = self.clone();
        stats.identity.scrub();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> UserIdentity {
        UserIdentity {
            id: "user-1".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            picture: "https://example.com/alice.png".to_string(),
            locale: "en".to_string(),
            verified_email: true,
        }
    }

    #[test]
    fn test_empty_record_has_zero_counts_and_finite_ratios() {
        let stats = UserStats::empty("user-1");

        assert_eq!(stats.user_id, "user-1");
        assert_eq!(stats.counts, StatCounts::default());
        assert_eq!(stats.metrics, DerivedMetrics::default());
        assert!(stats.metrics.reliability.is_finite());
        assert_eq!(stats.rating, RatingSnapshot::initial());
    }

    #[test]
    fn test_scrubbed_removes_email_only() {
        let stats = UserStats::empty("user-1").with_identity(identity());

        let scrubbed = stats.scrubbed();

        assert!(scrubbed.identity.email.is_empty());
        assert_eq!(scrubbed.identity.name, "Alice");
        assert_eq!(stats.identity.email, "alice@example.com");
    }

    #[test]
    fn test_serialized_record_is_flat_camel_case() {
        let mut counts = StatCounts::default();
        counts.set(Counter::ReadyTurnPhases, 3);
        let stats = UserStats::from_counts("user-1", counts);

        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["readyTurnPhases"], 3);
        assert_eq!(json["quickness"], 0.75);
        assert_eq!(json["rating"]["rating"], 1500.0);

        let back: UserStats = serde_json::from_value(json).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_partial_record_fills_missing_fields() {
        let json = serde_json::json!({
            "startedGames": 4,
            "hatedScore": -0.5,
            "identity": { "name": "Dev" }
        });

        let stats: UserStats = serde_json::from_value(json).unwrap();

        assert_eq!(stats.user_id, "");
        assert_eq!(stats.counts.started_games, 4);
        assert_eq!(stats.counts.finished_games, 0);
        assert_eq!(stats.metrics.hated_score, -0.5);
        assert_eq!(stats.metrics.reliability, 0.0);
        assert_eq!(stats.rating, RatingSnapshot::initial());
        assert_eq!(stats.identity.name, "Dev");
        assert!(!stats.identity.verified_email);
    }
}
