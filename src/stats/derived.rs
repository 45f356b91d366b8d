use serde::{Deserialize, Serialize};

use super::models::StatCounts;

/// Ratios derived from raw counts
///
/// Every denominator carries a `+1` smoothing term so the ratios are defined
/// for users with no history. `hater_score` and `hated_score` are heuristics
/// and are not clamped; `hated_score` goes negative when a
/// user owns more bans than they share.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivedMetrics {
    pub reliability: f64,
    pub quickness: f64,
    pub hater_score: f64,
    pub hated_score: f64,
}

impl DerivedMetrics {
    pub fn compute(counts: &StatCounts) -> Self {
        Self {
            reliability: reliability(
                counts.ready_turn_phases,
                counts.active_turn_phases,
                counts.missed_turn_phases,
            ),
            quickness: quickness(
                counts.ready_turn_phases,
                counts.active_turn_phases,
                counts.missed_turn_phases,
            ),
            hater_score: hater_score(counts.owned_ban_count, counts.started_games),
            hated_score: hated_score(
                counts.shared_ban_count,
                counts.owned_ban_count,
                counts.started_games,
            ),
        }
    }
}

fn phase_denominator(ready: u64, active: u64, missed: u64) -> f64 {
    (ready + active + missed) as f64 + 1.0
}

/// Share of phases where the user submitted orders in time
pub fn reliability(ready: u64, active: u64, missed: u64) -> f64 {
    (ready + active) as f64 / phase_denominator(ready, active, missed)
}

/// Share of phases where the user also declared themselves ready
pub fn quickness(ready: u64, active: u64, missed: u64) -> f64 {
    ready as f64 / phase_denominator(ready, active, missed)
}

pub fn hater_score(owned_bans: u64, started_games: u64) -> f64 {
    owned_bans as f64 / (started_games as f64 + 1.0)
}

pub fn hated_score(shared_bans: u64, owned_bans: u64, started_games: u64) -> f64 {
    (shared_bans as f64 - owned_bans as f64) / (started_games as f64 + 1.0)
}
