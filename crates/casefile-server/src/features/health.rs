//! Health endpoint

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ingest::framework::QueueDepth;
use crate::ingest::Pipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub queue: Option<QueueDepth>,
}

pub fn health_routes() -> Router<Arc<Pipeline>> {
    Router::new().route("/health", get(health_check))
}

/// GET /health
///
/// Reading the queue depth touches the backing store, so a broken database
/// shows up here as 503.
async fn health_check(State(pipeline): State<Arc<Pipeline>>) -> impl IntoResponse {
    let backend = format!("{:?}", pipeline.config().backend).to_ascii_lowercase();
    match pipeline.queue().depth().await {
        Ok(depth) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                backend,
                queue: Some(depth),
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                    backend,
                    queue: None,
                }),
            )
        },
    }
}
