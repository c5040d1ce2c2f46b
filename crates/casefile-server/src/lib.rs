//! Casefile Server Library
//!
//! Staged ingestion of mailbox archives. An archive is enqueued by content
//! hash, then workers move its job through extract, load, thread, dedupe and
//! index, one stage per queue delivery. Failures are retried with backoff up
//! to each stage's budget; exhausted or fatal jobs land in a dead-letter sink
//! from which operators can replay them.
//!
//! # Modules
//!
//! - **ingest**: the pipeline framework and the five stages
//! - **db**: Postgres-backed queue, job store, dead-letter sink and canonical tables
//! - **storage**: object stores for archives and extractor artifacts (S3, filesystem, memory)
//! - **features**: the HTTP API
//! - **config**: environment configuration
//!
//! # Example
//!
//! ```no_run
//! use casefile_server::{config::Config, create_router, ingest::{Pipeline, PipelineBackends}};
//! use casefile_server::storage::InMemoryObjectStore;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let backends = PipelineBackends::in_memory(Arc::new(InMemoryObjectStore::new()));
//! let pipeline = Arc::new(Pipeline::new(config.pipeline.clone(), backends)?);
//! let _app = create_router(pipeline, &config);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod storage;

use axum::Router;
use std::sync::Arc;

use crate::config::Config;
use crate::ingest::Pipeline;

pub use error::{AppError, AppResult};

/// Full application router: health at the root, features under `/api/v1`
pub fn create_router(pipeline: Arc<Pipeline>, config: &Config) -> Router {
    let feature_routes = features::router(features::FeatureState {
        pipeline: Arc::clone(&pipeline),
    });

    Router::new()
        .merge(features::health::health_routes().with_state(pipeline))
        .nest("/api/v1", feature_routes)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}
