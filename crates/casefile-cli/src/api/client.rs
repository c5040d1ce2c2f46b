//! HTTP API client for the casefile server

use crate::api::{endpoints, types::*};
use crate::error::{CliError, Result};
use casefile_common::types::{DeadLetterView, JobStatus, JobStatusView};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// API Client Constants
// ============================================================================

/// Default timeout for API requests in seconds.
/// Can be overridden via CASEFILE_API_TIMEOUT_SECS environment variable.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Default server URL when not specified via environment variable.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// API client for the casefile server
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let timeout_secs = std::env::var("CASEFILE_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_API_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("CASEFILE_SERVER_URL")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        Self::new(base_url)
    }

    /// Server health. A 503 still carries a body, so it is returned rather than raised.
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self.client.get(endpoints::health_url(&self.base_url)).send().await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(response.json().await?);
        }
        decode(response).await
    }

    /// Submit an archive. `created` is false when the archive was already known.
    pub async fn enqueue(&self, source_ref: SourceRef) -> Result<EnqueueResponse> {
        let response = self
            .client
            .post(endpoints::jobs_url(&self.base_url))
            .json(&EnqueueRequest { source_ref })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<JobStatusView> {
        let response = self.client.get(endpoints::job_url(&self.base_url, job_id)).send().await?;
        decode(response).await
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: Option<usize>) -> Result<JobList> {
        let url = endpoints::list_jobs_url(&self.base_url, status, limit);
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    /// Stage attempts in execution order
    pub async fn executions(&self, job_id: Uuid) -> Result<Vec<StageExecutionView>> {
        let url = endpoints::job_executions_url(&self.base_url, job_id);
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    pub async fn list_dead_letters(&self, limit: Option<usize>) -> Result<DeadLetterList> {
        let url = endpoints::dead_letters_url(&self.base_url, limit);
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    pub async fn get_dead_letter(&self, job_id: Uuid) -> Result<DeadLetterView> {
        let url = endpoints::dead_letter_url(&self.base_url, job_id);
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    pub async fn replay(&self, job_id: Uuid) -> Result<ReplayResponse> {
        let url = endpoints::replay_url(&self.base_url, job_id);
        let response = self.client.post(url).send().await?;
        decode(response).await
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Turn a response into `T`, mapping the server's error body onto [`CliError`]
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or_else(|_| if text.is_empty() { status.to_string() } else { text });

    if status == StatusCode::NOT_FOUND {
        Err(CliError::NotFound(message))
    } else {
        Err(CliError::api(status.as_u16(), message))
    }
}
