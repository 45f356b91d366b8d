use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::models::UserStats;
use crate::shared::{AppError, AppState};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 100;

/// Routes exposing the stats records
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(list_user_stats))
        .route("/stats/updates", post(request_stats_update))
        .route(
            "/users/:user_id/stats",
            get(get_user_stats).put(overwrite_user_stats),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsPage {
    pub items: Vec<UserStats>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub user_ids: Vec<String>,
}

/// GET /users/:user_id/stats
///
/// Users without a stored record get an all-zero record.
#[instrument(skip(state))]
pub async fn get_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStats>, AppError> {
    let stats = state
        .stats_repository
        .get_stats(&user_id)
        .await?
        .unwrap_or_else(|| UserStats::empty(user_id));

    Ok(Json(stats.scrubbed()))
}

/// GET /stats?cursor=&limit=
#[instrument(skip(state))]
pub async fn list_user_stats(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<StatsPage>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let items: Vec<UserStats> = state
        .stats_repository
        .list_stats(params.cursor.as_deref(), limit)
        .await?
        .iter()
        .map(UserStats::scrubbed)
        .collect();

    let next_cursor = if items.len() == limit {
        items.last().map(|s| s.user_id.clone())
    } else {
        None
    };

    Ok(Json(StatsPage { items, next_cursor }))
}

/// POST /stats/updates
#[instrument(skip(state, request), fields(count = request.user_ids.len()))]
pub async fn request_stats_update(
    State(state): State<AppState>,
    Json(request): Json<UpdateRequest>,
) -> Result<StatusCode, AppError> {
    if request.user_ids.iter().any(String::is_empty) {
        return Err(AppError::BadRequest("user ids must not be empty".to_string()));
    }

    state
        .stats_batch
        .schedule_stats_update(request.user_ids)
        .await?;

    Ok(StatusCode::ACCEPTED)
}

/// PUT /users/:user_id/stats
///
/// Development override that stores the posted record. Fields missing from
/// the body are stored as their empty values.
#[instrument(skip(state, stats))]
pub async fn overwrite_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(mut stats): Json<UserStats>,
) -> Result<StatusCode, AppError> {
    if !state.environment.is_local() {
        warn!(environment = %state.environment, "Rejected stats override outside local environment");
        return Err(AppError::Forbidden(
            "only accessible in local environments".to_string(),
        ));
    }

    stats.user_id = user_id;
    state.stats_repository.upsert_stats(&stats).await?;

    info!("Stats overridden");
    Ok(StatusCode::NO_CONTENT)
}
