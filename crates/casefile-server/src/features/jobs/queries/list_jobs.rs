//! List jobs query
//!
//! Supports filtering by status; newest activity first.

use casefile_common::types::{JobStatus, JobStatusView};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ingest::Pipeline;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobStatusView>,
    pub count: usize,
}

impl ListJobsQuery {
    pub fn validate(&self) -> Result<usize, AppError> {
        match self.limit {
            None => Ok(DEFAULT_LIMIT),
            Some(0) => Err(AppError::BadRequest("limit must be at least 1".to_string())),
            Some(limit) if limit > MAX_LIMIT => Err(AppError::BadRequest(format!(
                "limit must be at most {}",
                MAX_LIMIT
            ))),
            Some(limit) => Ok(limit),
        }
    }
}

pub async fn handle(pipeline: &Pipeline, query: ListJobsQuery) -> Result<ListJobsResponse, AppError> {
    let limit = query.validate()?;
    let jobs: Vec<JobStatusView> = pipeline
        .list_jobs(query.status, limit)
        .await?
        .iter()
        .map(|job| job.view())
        .collect();

    Ok(ListJobsResponse {
        count: jobs.len(),
        jobs,
    })
}
