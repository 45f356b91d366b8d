use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

/// Fieldless discriminant of [`Task`], used as the dispatch key
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, Display, EnumString, AsRefStr,
)]
pub enum TaskKind {
    #[strum(serialize = "stats-recalculate-batch")]
    #[serde(rename = "stats-recalculate-batch")]
    RecalculateBatch,
    #[strum(serialize = "stats-recalculate-user")]
    #[serde(rename = "stats-recalculate-user")]
    RecalculateUser,
}

/// A unit of deferred work and its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Task {
    /// Peel the head id off `user_ids` and reschedule the tail
    #[serde(rename = "stats-recalculate-batch")]
    RecalculateBatch { user_ids: Vec<String> },
    /// Recalculate and persist one user's statistics
    #[serde(rename = "stats-recalculate-user")]
    RecalculateUser { user_id: String },
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::RecalculateBatch { .. } => TaskKind::RecalculateBatch,
            Task::RecalculateUser { .. } => TaskKind::RecalculateUser,
        }
    }
}

/// A task that has been accepted by a queue
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub task: Task,
    pub run_at: DateTime<Utc>,
    /// Number of failed deliveries so far
    pub attempt: u32,
}

impl ScheduledTask {
    pub fn new(task: Task, run_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            run_at,
            attempt: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_at <= now
    }
}
