//! `casefile status`, `casefile jobs` and `casefile history`

use crate::api::ApiClient;
use crate::error::{CliError, Result};
use crate::output;
use crate::OutputFormat;
use casefile_common::types::JobStatus;
use uuid::Uuid;

pub async fn status(client: &ApiClient, job_id: Uuid, format: OutputFormat) -> Result<()> {
    let job = client.get_job(job_id).await?;
    output::job(&job, format)
}

pub async fn list(
    client: &ApiClient,
    status: Option<JobStatus>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    if limit == Some(0) {
        return Err(CliError::invalid_argument("--limit must be at least 1"));
    }
    let list = client.list_jobs(status, limit).await?;
    output::jobs(&list.jobs, format)
}

pub async fn history(client: &ApiClient, job_id: Uuid, format: OutputFormat) -> Result<()> {
    let history = client.executions(job_id).await?;
    output::executions(&history, format)
}
