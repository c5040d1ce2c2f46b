//! Feature modules implementing the casefile API
//!
//! Each feature is a vertical slice with its own `commands/` (writes),
//! `queries/` (reads) and `routes.rs`.
//!
//! - **jobs**: enqueue archives, job status and stage history
//! - **dead_letters**: inspect and replay terminally failed jobs
//! - **health**: liveness plus queue depth

pub mod dead_letters;
pub mod health;
pub mod jobs;

use axum::Router;
use std::sync::Arc;

use crate::ingest::Pipeline;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub pipeline: Arc<Pipeline>,
}

/// Creates the API router with all feature routes mounted:
/// - `/jobs` - Enqueue and inspect jobs
/// - `/dead-letters` - Dead-letter inspection and replay
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/jobs", jobs::jobs_routes().with_state(Arc::clone(&state.pipeline)))
        .nest(
            "/dead-letters",
            dead_letters::dead_letters_routes().with_state(Arc::clone(&state.pipeline)),
        )
}
