//! Response envelopes returned by the server
//!
//! Single-entity payloads reuse the shared wire types in
//! `casefile_common::types`.

use casefile_common::types::{DeadLetterView, JobStatusView};
use serde::{Deserialize, Serialize};

pub use casefile_common::types::{
    EnqueueRequest, EnqueueResponse, ErrorBody, ReplayResponse, SourceRef, StageExecutionView,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<JobStatusView>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterList {
    pub entries: Vec<DeadLetterView>,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueCounts {
    pub ready: u64,
    pub delayed: u64,
    pub leased: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub backend: String,
    pub queue: Option<QueueCounts>,
}
