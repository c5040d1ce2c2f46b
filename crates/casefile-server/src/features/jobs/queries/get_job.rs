//! Get job query

use casefile_common::types::JobStatusView;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::ingest::framework::PipelineError;
use crate::ingest::Pipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobQuery {
    pub job_id: Uuid,
}

pub async fn handle(pipeline: &Pipeline, query: GetJobQuery) -> Result<JobStatusView, AppError> {
    let job = pipeline
        .job(query.job_id)
        .await?
        .ok_or(PipelineError::JobNotFound(query.job_id))?;

    Ok(job.view())
}
