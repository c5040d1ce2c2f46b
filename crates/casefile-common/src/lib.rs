//! Casefile Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the casefile workspace.
//!
//! - **Error Handling**: [`CasefileError`] and the [`Result`] alias
//! - **Checksums**: SHA-256 content hashes and stable, content-derived identities
//! - **Logging**: tracing subscriber setup shared by the server and CLI
//! - **Types**: wire types exchanged between the pipeline server and its clients
//!
//! # Example
//!
//! ```no_run
//! use casefile_common::checksum::{file_sha256, stable_uuid};
//!
//! fn job_for(path: &str) -> casefile_common::Result<uuid::Uuid> {
//!     let hash = file_sha256(path)?;
//!     Ok(stable_uuid(&hash))
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CasefileError, Result};
