use casefile_common::types::DeadLetterView;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::ingest::framework::PipelineError;
use crate::ingest::Pipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDeadLetterQuery {
    pub job_id: Uuid,
}

pub async fn handle(pipeline: &Pipeline, query: GetDeadLetterQuery) -> Result<DeadLetterView, AppError> {
    let entry = pipeline
        .dead_letters()
        .get(query.job_id)
        .await?
        .ok_or(PipelineError::DeadLetterNotFound(query.job_id))?;

    Ok(entry.view())
}
