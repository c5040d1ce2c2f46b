//! Dead-letter feature module
//!
//! Operators list and inspect jobs that exhausted their retries or failed
//! fatally, and replay them as fresh jobs.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::dead_letters_routes;
