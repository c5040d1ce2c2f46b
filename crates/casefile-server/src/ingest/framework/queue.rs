//! Job queue adapter: at-least-once delivery with renewable leases
//!
//! The backend only knows about messages and leases. The adapter layers the
//! pipeline rules on top: deterministic enqueue keyed by content hash, and
//! routing of messages that exceeded the delivery budget to the dead-letter
//! sink even when no orchestrator ever finished a stage for them.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dead_letter::DeadLetterSink;
use super::error::{PipelineError, PipelineResult};
use super::store::JobStore;
use super::types::{
    DeadLetterEntry, Job, JobStatus, Lease, LeasedJob, QueueDepth, QueueMessage, SourceRef,
    StageName,
};
use crate::ingest::config::PipelineConfig;

/// Durable message store with visibility delays and leases
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Insert a message unless one for the same job exists. Returns true if inserted.
    async fn publish(&self, message: QueueMessage) -> PipelineResult<bool>;

    /// Lease the oldest visible, unleased message and bump its delivery count
    async fn receive(&self, lease_for: Duration) -> PipelineResult<Option<LeasedJob>>;

    /// Push the lease expiry out; `LeaseLost` if the token no longer matches
    async fn extend(&self, lease: &Lease, lease_for: Duration) -> PipelineResult<Lease>;

    /// Delete the message held under `lease`
    async fn ack(&self, lease: &Lease) -> PipelineResult<()>;

    /// Drop the lease and make the message visible again after `delay`
    async fn release(&self, lease: &Lease, delay: Duration, reset_deliveries: bool) -> PipelineResult<()>;

    /// Delete the message for `job_id` regardless of lease state
    async fn remove(&self, job_id: Uuid) -> PipelineResult<()>;

    async fn depth(&self) -> PipelineResult<QueueDepth>;
}

/// Result of an enqueue request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub job_id: Uuid,
    pub created: bool,
}

pub struct JobQueueAdapter {
    backend: Arc<dyn QueueBackend>,
    jobs: Arc<dyn JobStore>,
    sink: Arc<dyn DeadLetterSink>,
    lease_duration: Duration,
    max_deliveries: u32,
    poll_interval: Duration,
}

impl JobQueueAdapter {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        jobs: Arc<dyn JobStore>,
        sink: Arc<dyn DeadLetterSink>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            backend,
            jobs,
            sink,
            lease_duration: config.lease_duration,
            max_deliveries: config.max_deliveries,
            poll_interval: config.poll_interval,
        }
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Enqueue work for an archive. Same content hash, same job id.
    pub async fn enqueue(&self, source_ref: SourceRef) -> PipelineResult<Enqueued> {
        source_ref.validate()?;
        self.enqueue_job(Job::new(source_ref)).await
    }

    /// Enqueue a prepared job record (fresh jobs and replays)
    pub async fn enqueue_job(&self, job: Job) -> PipelineResult<Enqueued> {
        job.source_ref.validate()?;
        let created = self.jobs.create_if_absent(&job).await?;
        let stored = self
            .jobs
            .get(job.job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(job.job_id))?;

        // Publishing is idempotent, so a crash between the job insert and the
        // publish is repaired by the next enqueue of the same archive.
        if matches!(
            stored.status,
            JobStatus::Queued | JobStatus::RetryPending | JobStatus::Running
        ) {
            let published = self.backend.publish(QueueMessage::for_job(&stored)).await?;
            debug!(job_id = %stored.job_id, published, "Queue message ensured");
        }

        if created {
            info!(
                job_id = %stored.job_id,
                content_hash = %stored.source_ref.content_hash,
                replay_of = ?stored.replay_of,
                "Job enqueued"
            );
        } else {
            info!(job_id = %stored.job_id, status = %stored.status, "Archive already enqueued");
        }

        Ok(Enqueued {
            job_id: stored.job_id,
            created,
        })
    }

    /// Wait up to `timeout` for a deliverable job
    pub async fn claim(&self, timeout: Duration) -> PipelineResult<Option<LeasedJob>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(leased) = self.backend.receive(self.lease_duration).await? {
                if leased.message.delivery_count > self.max_deliveries {
                    self.route_exhausted(&leased).await?;
                    continue;
                }
                debug!(
                    job_id = %leased.message.job_id,
                    delivery_count = leased.message.delivery_count,
                    "Job claimed"
                );
                return Ok(Some(leased));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    pub async fn extend_lease(&self, lease: &Lease) -> PipelineResult<Lease> {
        self.backend.extend(lease, self.lease_duration).await
    }

    pub async fn ack(&self, lease: &Lease) -> PipelineResult<()> {
        self.backend.ack(lease).await
    }

    /// Return the job for redelivery after `delay`
    pub async fn nack(&self, lease: &Lease, reason: &str, delay: Duration) -> PipelineResult<()> {
        debug!(job_id = %lease.job_id, reason, delay_ms = delay.as_millis() as u64, "Job nacked");
        self.backend.release(lease, delay, false).await
    }

    /// Make the job immediately available for its next stage with a fresh delivery budget
    pub async fn checkpoint(&self, lease: &Lease) -> PipelineResult<()> {
        self.backend.release(lease, Duration::ZERO, true).await
    }

    /// Record a terminal failure and drop the job's message
    pub async fn dead_letter(&self, entry: &DeadLetterEntry) -> PipelineResult<()> {
        let appended = self.sink.append(entry).await?;
        self.backend.remove(entry.job_id).await?;
        if appended {
            warn!(
                job_id = %entry.job_id,
                stage = %entry.stage_name,
                total_attempts = entry.total_attempts,
                error = %entry.last_error,
                "Job dead-lettered"
            );
        }
        Ok(())
    }

    pub async fn depth(&self) -> PipelineResult<QueueDepth> {
        self.backend.depth().await
    }

    async fn route_exhausted(&self, leased: &LeasedJob) -> PipelineResult<()> {
        let job_id = leased.message.job_id;
        let reason = format!(
            "exceeded max deliveries ({}) without completing a stage",
            self.max_deliveries
        );
        let job = self.jobs.get(job_id).await?;

        let last_error = match job.as_ref().and_then(|j| j.last_error.as_deref()) {
            Some(previous) => format!("{}; last error: {}", reason, previous),
            None => reason,
        };
        let entry = DeadLetterEntry {
            job_id,
            stage_name: job
                .as_ref()
                .map(|j| j.current_stage)
                .unwrap_or(StageName::Extract),
            total_attempts: leased.message.delivery_count.saturating_sub(1),
            last_error: last_error.clone(),
            created_at: Utc::now(),
        };
        self.dead_letter(&entry).await?;

        let mut current = job;
        for _ in 0..3 {
            let Some(mut job) = current.take() else {
                break;
            };
            if job.status.is_terminal() {
                break;
            }
            job.status = JobStatus::DeadLettered;
            job.last_error = Some(last_error.clone());
            match self.jobs.commit(&job, None).await {
                Ok(_) => break,
                Err(PipelineError::VersionConflict { .. }) => {
                    current = self.jobs.get(job_id).await?;
                },
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}
