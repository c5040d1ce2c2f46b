//! Replay a dead-lettered job
//!
//! Starts a new job for the same archive. The dead-letter entry and the
//! original job record stay as they are, and replaying one entry twice
//! returns the same new job.

use casefile_common::types::ReplayResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::ingest::Pipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayCommand {
    pub job_id: Uuid,
}

#[tracing::instrument(skip(pipeline), fields(job_id = %command.job_id))]
pub async fn handle(pipeline: &Pipeline, command: ReplayCommand) -> Result<ReplayResponse, AppError> {
    let enqueued = pipeline.dead_letters().replay(command.job_id).await?;

    Ok(ReplayResponse {
        job_id: enqueued.job_id,
        replay_of: command.job_id,
    })
}
