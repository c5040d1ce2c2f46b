//! Stage execution history of one job, oldest first

use casefile_common::types::StageExecutionView;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::ingest::framework::PipelineError;
use crate::ingest::Pipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListExecutionsQuery {
    pub job_id: Uuid,
}

pub async fn handle(
    pipeline: &Pipeline,
    query: ListExecutionsQuery,
) -> Result<Vec<StageExecutionView>, AppError> {
    // an unknown job is a 404, not an empty history
    pipeline
        .job(query.job_id)
        .await?
        .ok_or(PipelineError::JobNotFound(query.job_id))?;

    let executions = pipeline.executions(query.job_id).await?;
    Ok(executions.iter().map(|e| e.view()).collect())
}
