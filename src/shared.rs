use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::config::ExecutionEnvironment;
use crate::stats::{StatsBatchScheduler, StatsError, StatsRepository};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub stats_repository: Arc<dyn StatsRepository>,
    pub stats_batch: Arc<StatsBatchScheduler>,
    pub environment: ExecutionEnvironment,
}

impl AppState {
    pub fn new(
        stats_repository: Arc<dyn StatsRepository>,
        stats_batch: Arc<StatsBatchScheduler>,
        environment: ExecutionEnvironment,
    ) -> Self {
        Self {
            stats_repository,
            stats_batch,
            environment,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    Internal,
}

impl From<StatsError> for AppError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::Validation(msg) => AppError::BadRequest(msg),
            StatsError::Query(msg) | StatsError::Repository(msg) => AppError::DatabaseError(msg),
            other => {
                error!(error = %other, "Stats operation failed");
                AppError::Internal
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
