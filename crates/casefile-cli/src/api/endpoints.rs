//! API endpoint URL builders

use casefile_common::types::JobStatus;
use uuid::Uuid;

pub fn health_url(base_url: &str) -> String {
    format!("{}/health", base_url)
}

pub fn jobs_url(base_url: &str) -> String {
    format!("{}/api/v1/jobs", base_url)
}

/// Job listing with optional filters
pub fn list_jobs_url(base_url: &str, status: Option<JobStatus>, limit: Option<usize>) -> String {
    let mut params = Vec::new();
    if let Some(status) = status {
        params.push(format!("status={}", status.as_str()));
    }
    if let Some(limit) = limit {
        params.push(format!("limit={}", limit));
    }

    let mut url = jobs_url(base_url);
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

pub fn job_url(base_url: &str, job_id: Uuid) -> String {
    format!("{}/api/v1/jobs/{}", base_url, job_id)
}

pub fn job_executions_url(base_url: &str, job_id: Uuid) -> String {
    format!("{}/api/v1/jobs/{}/executions", base_url, job_id)
}

pub fn dead_letters_url(base_url: &str, limit: Option<usize>) -> String {
    match limit {
        Some(limit) => format!("{}/api/v1/dead-letters?limit={}", base_url, limit),
        None => format!("{}/api/v1/dead-letters", base_url),
    }
}

pub fn dead_letter_url(base_url: &str, job_id: Uuid) -> String {
    format!("{}/api/v1/dead-letters/{}", base_url, job_id)
}

pub fn replay_url(base_url: &str, job_id: Uuid) -> String {
    format!("{}/api/v1/dead-letters/{}/replay", base_url, job_id)
}
