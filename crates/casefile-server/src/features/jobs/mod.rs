//! Jobs feature module
//!
//! Enqueue archives and inspect job progress. Jobs are only ever advanced
//! by the workers; there are no endpoints that change a job's stage.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::jobs_routes;
