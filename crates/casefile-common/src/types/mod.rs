//! Wire types shared by the pipeline server and its clients

use crate::checksum::is_sha256_hex;
use crate::error::{CasefileError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Location and content hash of one source archive.
///
/// The content hash (hex SHA-256 of the archive bytes) is the archive's
/// identity; the location is only where to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub location: String,
    pub content_hash: String,
}

impl SourceRef {
    pub fn new(location: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            content_hash: content_hash.into().to_ascii_lowercase(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.location.trim().is_empty() {
            return Err(CasefileError::InvalidSourceRef("location must not be empty".into()));
        }
        if !is_sha256_hex(&self.content_hash) {
            return Err(CasefileError::InvalidSourceRef(format!(
                "content_hash must be a 64-character hex SHA-256, got '{}'",
                self.content_hash
            )));
        }
        Ok(())
    }
}

/// The fixed processing sequence, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Extract,
    Load,
    Thread,
    Dedupe,
    Index,
}

impl StageName {
    pub const ALL: [StageName; 5] = [
        StageName::Extract,
        StageName::Load,
        StageName::Thread,
        StageName::Dedupe,
        StageName::Index,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Extract => "extract",
            StageName::Load => "load",
            StageName::Thread => "thread",
            StageName::Dedupe => "dedupe",
            StageName::Index => "index",
        }
    }

    /// Progressive form used in status displays ("extracting", "loading", ...)
    pub fn activity(&self) -> &'static str {
        match self {
            StageName::Extract => "extracting",
            StageName::Load => "loading",
            StageName::Thread => "threading",
            StageName::Dedupe => "deduping",
            StageName::Index => "indexing",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = CasefileError;

    fn from_str(s: &str) -> Result<Self> {
        StageName::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| CasefileError::UnknownStage(s.to_string()))
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    RetryPending,
    Completed,
    /// Terminal failure decided, dead-letter routing in progress
    Failed,
    DeadLettered,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::RetryPending => "retry_pending",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::DeadLettered => "dead_lettered",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CasefileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "retry_pending" => Ok(JobStatus::RetryPending),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "dead_lettered" => Ok(JobStatus::DeadLettered),
            other => Err(CasefileError::UnknownStatus(other.to_string())),
        }
    }
}

/// Result class of one stage attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    RetryableFailure,
    FatalFailure,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::RetryableFailure => "retryable_failure",
            OutcomeKind::FatalFailure => "fatal_failure",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeKind {
    type Err = CasefileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(OutcomeKind::Success),
            "retryable_failure" => Ok(OutcomeKind::RetryableFailure),
            "fatal_failure" => Ok(OutcomeKind::FatalFailure),
            other => Err(CasefileError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// HTTP contract
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub source_ref: SourceRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub job_id: Uuid,
    /// False when the content hash was already enqueued
    pub created: bool,
}

/// Read-only projection of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub source_ref: SourceRef,
    pub current_stage: StageName,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub replay_of: Option<Uuid>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecutionView {
    pub job_id: Uuid,
    pub stage_name: StageName,
    pub attempt_no: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: OutcomeKind,
    pub output_ref: Option<String>,
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterView {
    pub job_id: Uuid,
    pub stage_name: StageName,
    pub total_attempts: u32,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResponse {
    pub job_id: Uuid,
    pub replay_of: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
