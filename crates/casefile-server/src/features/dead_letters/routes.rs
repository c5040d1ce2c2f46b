//! Dead-letter routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use super::commands::replay::{handle as handle_replay, ReplayCommand};
use super::queries::{
    get_dead_letter::handle as handle_get, list_dead_letters::handle as handle_list,
    GetDeadLetterQuery, ListDeadLettersQuery,
};
use crate::error::AppResult;
use crate::ingest::Pipeline;

pub fn dead_letters_routes() -> Router<Arc<Pipeline>> {
    Router::new()
        .route("/", get(list_dead_letters))
        .route("/:job_id", get(get_dead_letter))
        .route("/:job_id/replay", post(replay_dead_letter))
}

/// GET /dead-letters?limit=100
async fn list_dead_letters(
    State(pipeline): State<Arc<Pipeline>>,
    Query(query): Query<ListDeadLettersQuery>,
) -> AppResult<Response> {
    Ok(Json(handle_list(&pipeline, query).await?).into_response())
}

/// GET /dead-letters/:job_id
async fn get_dead_letter(
    State(pipeline): State<Arc<Pipeline>>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Response> {
    Ok(Json(handle_get(&pipeline, GetDeadLetterQuery { job_id }).await?).into_response())
}

/// POST /dead-letters/:job_id/replay
async fn replay_dead_letter(
    State(pipeline): State<Arc<Pipeline>>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Response> {
    let response = handle_replay(&pipeline, ReplayCommand { job_id }).await?;
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}
