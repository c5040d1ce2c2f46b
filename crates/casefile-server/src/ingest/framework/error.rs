//! Pipeline and stage error types

use thiserror::Error;
use uuid::Uuid;

use super::types::StageOutcome;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Failures of the pipeline machinery itself (queue, job store, sinks)
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Lease on job {job_id} is no longer held")]
    LeaseLost { job_id: Uuid },

    #[error("Job {job_id} was modified concurrently (expected version {expected})")]
    VersionConflict { job_id: Uuid, expected: i64 },

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Dead-letter entry not found: {0}")]
    DeadLetterNotFound(Uuid),

    #[error("Stage {0} has no registered implementation")]
    StageNotRegistered(String),

    #[error("Invalid request: {0}")]
    Invalid(#[from] casefile_common::CasefileError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// True for outcomes that mean another worker has taken over the job
    pub fn is_superseded(&self) -> bool {
        matches!(
            self,
            PipelineError::LeaseLost { .. } | PipelineError::VersionConflict { .. }
        )
    }
}

/// Classified stage failure.
///
/// Stages never retry internally; they return one of these and the
/// orchestrator decides between retry and dead-letter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    #[error("validation failed: {message}")]
    Validation { message: String, transient: bool },

    #[error("corrupt input: {0}")]
    CorruptInput(String),

    #[error("structural mismatch: {0}")]
    Structural(String),
}

impl StageError {
    pub fn transient(message: impl Into<String>) -> Self {
        StageError::TransientIo(message.into())
    }

    /// Wrap an I/O-side failure, keeping the whole context chain
    pub fn io(err: &anyhow::Error) -> Self {
        StageError::TransientIo(format!("{:#}", err))
    }

    pub fn validation(message: impl Into<String>, transient: bool) -> Self {
        StageError::Validation {
            message: message.into(),
            transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::TransientIo(_) | StageError::ResourceExhaustion(_) => true,
            StageError::Validation { transient, .. } => *transient,
            StageError::CorruptInput(_) | StageError::Structural(_) => false,
        }
    }

    pub fn into_outcome(self) -> StageOutcome {
        let error = self.to_string();
        if self.is_retryable() {
            StageOutcome::RetryableFailure { error }
        } else {
            StageOutcome::FatalFailure { error }
        }
    }
}

impl From<PipelineError> for StageError {
    fn from(err: PipelineError) -> Self {
        StageError::TransientIo(err.to_string())
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::OutOfMemory => StageError::ResourceExhaustion(err.to_string()),
            _ => StageError::TransientIo(err.to_string()),
        }
    }
}
