//! Job routes
//!
//! - `POST /jobs` enqueues an archive (202 when a new job was created, 200
//!   when the archive was already known)
//! - `GET /jobs` lists jobs, optionally filtered by status
//! - `GET /jobs/:job_id` returns the job's status view
//! - `GET /jobs/:job_id/executions` returns its stage execution history

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use casefile_common::types::EnqueueRequest;
use std::sync::Arc;
use uuid::Uuid;

use super::commands::enqueue::handle as handle_enqueue;
use super::queries::{
    get_job::handle as handle_get_job, list_executions::handle as handle_list_executions,
    list_jobs::handle as handle_list_jobs, GetJobQuery, ListExecutionsQuery, ListJobsQuery,
};
use crate::error::AppResult;
use crate::ingest::Pipeline;

pub fn jobs_routes() -> Router<Arc<Pipeline>> {
    Router::new()
        .route("/", get(list_jobs).post(enqueue_job))
        .route("/:job_id", get(get_job))
        .route("/:job_id/executions", get(list_executions))
}

/// POST /jobs
async fn enqueue_job(
    State(pipeline): State<Arc<Pipeline>>,
    Json(request): Json<EnqueueRequest>,
) -> AppResult<Response> {
    let response = handle_enqueue(&pipeline, request.into()).await?;
    let status = if response.created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)).into_response())
}

/// GET /jobs?status=dead_lettered&limit=20
async fn list_jobs(
    State(pipeline): State<Arc<Pipeline>>,
    Query(query): Query<ListJobsQuery>,
) -> AppResult<Response> {
    let response = handle_list_jobs(&pipeline, query).await?;
    Ok(Json(response).into_response())
}

/// GET /jobs/:job_id
async fn get_job(
    State(pipeline): State<Arc<Pipeline>>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Response> {
    let job = handle_get_job(&pipeline, GetJobQuery { job_id }).await?;
    Ok(Json(job).into_response())
}

/// GET /jobs/:job_id/executions
async fn list_executions(
    State(pipeline): State<Arc<Pipeline>>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Response> {
    let executions = handle_list_executions(&pipeline, ListExecutionsQuery { job_id }).await?;
    Ok(Json(executions).into_response())
}
