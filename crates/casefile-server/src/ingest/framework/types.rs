//! Core types for the staged pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub use casefile_common::checksum::{job_id_for, replay_job_id_for};
use casefile_common::types::{DeadLetterView, JobStatusView, StageExecutionView};
pub use casefile_common::types::{JobStatus, OutcomeKind, SourceRef, StageName};

/// Version of the tabular export layout the loader understands
pub const SCHEMA_VERSION: &str = "1";

/// Ordered stage sequence shared by all jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<StageName>,
}

impl StagePlan {
    /// extract -> load -> thread -> dedupe -> index
    pub fn standard() -> Self {
        Self {
            stages: StageName::ALL.to_vec(),
        }
    }

    pub fn stages(&self) -> &[StageName] {
        &self.stages
    }

    pub fn first(&self) -> StageName {
        self.stages[0]
    }

    pub fn next(&self, stage: StageName) -> Option<StageName> {
        let idx = self.stages.iter().position(|s| *s == stage)?;
        self.stages.get(idx + 1).copied()
    }

    pub fn is_last(&self, stage: StageName) -> bool {
        self.stages.last() == Some(&stage)
    }
}

impl Default for StagePlan {
    fn default() -> Self {
        Self::standard()
    }
}

/// One pipeline run over one source archive.
///
/// `version` is the optimistic-concurrency counter: every persisted change
/// must name the version it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub source_ref: SourceRef,
    pub enqueued_at: DateTime<Utc>,
    pub current_stage: StageName,
    /// Failed attempts of `current_stage`
    pub attempt_count: u32,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub replay_of: Option<Uuid>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(source_ref: SourceRef) -> Self {
        let job_id = job_id_for(&source_ref.content_hash);
        Self::with_id(job_id, source_ref, None)
    }

    pub fn replay(source_ref: SourceRef, replay_of: Uuid) -> Self {
        let job_id = replay_job_id_for(&source_ref.content_hash, replay_of);
        Self::with_id(job_id, source_ref, Some(replay_of))
    }

    pub fn with_id(job_id: Uuid, source_ref: SourceRef, replay_of: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            source_ref,
            enqueued_at: now,
            current_stage: StagePlan::standard().first(),
            attempt_count: 0,
            status: JobStatus::Queued,
            last_error: None,
            replay_of,
            version: 0,
            updated_at: now,
        }
    }

    /// Attempt number the next execution of `current_stage` will carry
    pub fn next_attempt_no(&self) -> u32 {
        self.attempt_count + 1
    }

    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.job_id,
            source_ref: self.source_ref.clone(),
            current_stage: self.current_stage,
            status: self.status,
            attempt_count: self.attempt_count,
            last_error: self.last_error.clone(),
            replay_of: self.replay_of,
            enqueued_at: self.enqueued_at,
            updated_at: self.updated_at,
        }
    }
}

/// Tagged result of one stage attempt, consumed only by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Success { output_ref: String },
    RetryableFailure { error: String },
    FatalFailure { error: String },
}

impl StageOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            StageOutcome::Success { .. } => OutcomeKind::Success,
            StageOutcome::RetryableFailure { .. } => OutcomeKind::RetryableFailure,
            StageOutcome::FatalFailure { .. } => OutcomeKind::FatalFailure,
        }
    }
}

/// Append-only record of one stage attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecution {
    pub job_id: Uuid,
    pub stage_name: StageName,
    pub attempt_no: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: OutcomeKind,
    pub output_ref: Option<String>,
    pub error_detail: Option<String>,
}

impl StageExecution {
    pub fn from_outcome(
        job_id: Uuid,
        stage_name: StageName,
        attempt_no: u32,
        started_at: DateTime<Utc>,
        outcome: &StageOutcome,
    ) -> Self {
        let (output_ref, error_detail) = match outcome {
            StageOutcome::Success { output_ref } => (Some(output_ref.clone()), None),
            StageOutcome::RetryableFailure { error } | StageOutcome::FatalFailure { error } => {
                (None, Some(error.clone()))
            },
        };
        Self {
            job_id,
            stage_name,
            attempt_no,
            started_at,
            ended_at: Utc::now(),
            outcome: outcome.kind(),
            output_ref,
            error_detail,
        }
    }

    pub fn view(&self) -> StageExecutionView {
        StageExecutionView {
            job_id: self.job_id,
            stage_name: self.stage_name,
            attempt_no: self.attempt_no,
            started_at: self.started_at,
            ended_at: self.ended_at,
            outcome: self.outcome,
            output_ref: self.output_ref.clone(),
            error_detail: self.error_detail.clone(),
        }
    }
}

/// Commit marker of a successful extraction, always the last artifact written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub record_count: u64,
    /// Absent from manifests written before attachments were exported
    #[serde(default)]
    pub attachment_count: u64,
    /// Artifact file name -> hex SHA-256
    pub output_checksums: BTreeMap<String, String>,
    pub elapsed_ms: u64,
    pub extractor_version: String,
    pub schema_version: String,
}

/// Terminal record for a job that exhausted retries or failed fatally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job_id: Uuid,
    pub stage_name: StageName,
    pub total_attempts: u32,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn view(&self) -> DeadLetterView {
        DeadLetterView {
            job_id: self.job_id,
            stage_name: self.stage_name,
            total_attempts: self.total_attempts,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
        }
    }
}

/// Queue payload for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub job_id: Uuid,
    pub source_ref: SourceRef,
    pub enqueued_at: DateTime<Utc>,
    pub delivery_count: u32,
}

impl QueueMessage {
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.job_id,
            source_ref: job.source_ref.clone(),
            enqueued_at: job.enqueued_at,
            delivery_count: 0,
        }
    }
}

/// Time-bounded claim on a queued job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub job_id: Uuid,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeasedJob {
    pub message: QueueMessage,
    pub lease: Lease,
}

/// Queue counters for health reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub ready: u64,
    pub delayed: u64,
    pub leased: u64,
}
