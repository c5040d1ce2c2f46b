//! Enqueue job command
//!
//! Submits a source archive for ingestion. The job id is derived from the
//! archive's content hash, so resubmitting the same archive returns the
//! existing job instead of starting a second run.

use casefile_common::types::{EnqueueRequest, EnqueueResponse, SourceRef};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ingest::Pipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueJobCommand {
    pub source_ref: SourceRef,
}

impl From<EnqueueRequest> for EnqueueJobCommand {
    fn from(request: EnqueueRequest) -> Self {
        Self {
            source_ref: request.source_ref,
        }
    }
}

impl EnqueueJobCommand {
    pub fn validate(&self) -> Result<(), AppError> {
        self.source_ref
            .validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))
    }
}

#[tracing::instrument(skip(pipeline), fields(location = %command.source_ref.location))]
pub async fn handle(pipeline: &Pipeline, command: EnqueueJobCommand) -> Result<EnqueueResponse, AppError> {
    command.validate()?;

    let enqueued = pipeline.enqueue(command.source_ref).await?;

    Ok(EnqueueResponse {
        job_id: enqueued.job_id,
        created: enqueued.created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_hash() {
        let command = EnqueueJobCommand {
            source_ref: SourceRef::new("mem://a.mbox", "not-a-hash"),
        };
        assert!(matches!(command.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_validate_accepts_sha256() {
        let command = EnqueueJobCommand {
            source_ref: SourceRef::new("mem://a.mbox", "a".repeat(64)),
        };
        command.validate().unwrap();
    }
}
