//! CLI command implementations
//!
//! Each subcommand has its own module. Commands that talk to the server take
//! an [`ApiClient`](crate::api::ApiClient) so tests can point them at a mock.

pub mod dead_letters;
pub mod enqueue;
pub mod hash;
pub mod health;
pub mod jobs;
