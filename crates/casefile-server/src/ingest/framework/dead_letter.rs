//! Dead-letter sink and operator replay

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::error::{PipelineError, PipelineResult};
use super::queue::{Enqueued, JobQueueAdapter};
use super::store::JobStore;
use super::types::{DeadLetterEntry, Job};

/// Append-only store of terminal failures
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Store `entry` unless an entry for the job exists. Returns true if stored.
    /// Existing entries are never overwritten.
    async fn append(&self, entry: &DeadLetterEntry) -> PipelineResult<bool>;

    /// Newest entries first
    async fn list(&self, limit: usize) -> PipelineResult<Vec<DeadLetterEntry>>;

    async fn get(&self, job_id: Uuid) -> PipelineResult<Option<DeadLetterEntry>>;
}

/// Operator-facing view of the sink
pub struct DeadLetters {
    sink: Arc<dyn DeadLetterSink>,
    jobs: Arc<dyn JobStore>,
    queue: Arc<JobQueueAdapter>,
}

impl DeadLetters {
    pub fn new(
        sink: Arc<dyn DeadLetterSink>,
        jobs: Arc<dyn JobStore>,
        queue: Arc<JobQueueAdapter>,
    ) -> Self {
        Self { sink, jobs, queue }
    }

    pub async fn list(&self, limit: usize) -> PipelineResult<Vec<DeadLetterEntry>> {
        self.sink.list(limit).await
    }

    pub async fn get(&self, job_id: Uuid) -> PipelineResult<Option<DeadLetterEntry>> {
        self.sink.get(job_id).await
    }

    /// Start a brand-new job for the dead-lettered archive.
    ///
    /// The new job id is derived from the dead-lettered one, so replaying the
    /// same entry twice yields the same job. Neither the entry nor the old job
    /// record is touched.
    pub async fn replay(&self, job_id: Uuid) -> PipelineResult<Enqueued> {
        self.sink
            .get(job_id)
            .await?
            .ok_or(PipelineError::DeadLetterNotFound(job_id))?;
        let original = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(job_id))?;

        let enqueued = self
            .queue
            .enqueue_job(Job::replay(original.source_ref, job_id))
            .await?;
        info!(
            replay_of = %job_id,
            job_id = %enqueued.job_id,
            created = enqueued.created,
            "Dead-lettered job replayed"
        );
        Ok(enqueued)
    }
}
