use thiserror::Error;

use crate::tasks::TaskError;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Query error: {0}")]
    Query(String),

    #[error("Scheduling error: {0}")]
    Scheduling(#[from] TaskError),

    #[error("Rating service error: {0}")]
    Rating(String),

    #[error("Identity store error: {0}")]
    Identity(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<StatsError> for TaskError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::Scheduling(inner) => inner,
            StatsError::Validation(msg) => TaskError::Rejected(msg),
            other => TaskError::Failed(other.to_string()),
        }
    }
}
