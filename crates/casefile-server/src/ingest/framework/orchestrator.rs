//! Orchestrator: the per-job state machine
//!
//! ```text
//! Queued -> Extracting -> Loading -> Threading -> Deduping -> Indexing -> Completed
//!              |             |           |           |           |
//!              +-- RetryPending(stage) (same stage again after backoff)
//!              +-- DeadLettered
//! ```
//!
//! One claim runs exactly one stage: the stage named by the persisted job
//! record, never by worker memory. A success advances the record and hands
//! the message back to the queue for the next stage, so a crash at any point
//! resumes from the last committed stage. Every job write is a compare-and-
//! swap on the record version; a worker whose lease was taken over loses that
//! race and its result is discarded without trace.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::{PipelineError, PipelineResult, StageError};
use super::queue::JobQueueAdapter;
use super::stage::{StageContext, StageSet};
use super::store::JobStore;
use super::types::{
    DeadLetterEntry, Job, JobStatus, Lease, StageExecution, StageName, StageOutcome, StagePlan,
};
use crate::ingest::config::PipelineConfig;

/// A job whose message this worker currently leases
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: Job,
    pub lease: Lease,
    pub delivery_count: u32,
}

/// What one `run_stage` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Stage succeeded and the job moved on to `next`
    Advanced { next: StageName },
    Completed,
    RetryScheduled { attempt_count: u32, delay: Duration },
    DeadLettered,
    /// Another worker owns the job now; nothing was recorded
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub job_id: Uuid,
    pub stage: StageName,
    pub attempt_no: u32,
    pub result: StepResult,
}

pub struct Orchestrator {
    queue: Arc<JobQueueAdapter>,
    jobs: Arc<dyn JobStore>,
    stages: StageSet,
    plan: StagePlan,
    config: Arc<PipelineConfig>,
}

impl Orchestrator {
    pub fn new(
        queue: Arc<JobQueueAdapter>,
        jobs: Arc<dyn JobStore>,
        stages: StageSet,
        config: Arc<PipelineConfig>,
    ) -> PipelineResult<Self> {
        let plan = StagePlan::standard();
        stages.check_covers(&plan)?;
        Ok(Self {
            queue,
            jobs,
            stages,
            plan,
            config,
        })
    }

    pub fn queue(&self) -> &Arc<JobQueueAdapter> {
        &self.queue
    }

    /// Lease the next runnable job, waiting up to `timeout`.
    ///
    /// Stale messages for finished jobs are acknowledged and skipped. Jobs
    /// left in `Failed` by a crash mid dead-letter routing are finished here.
    pub async fn claim_next(&self, timeout: Duration) -> PipelineResult<Option<ClaimedJob>> {
        loop {
            let Some(leased) = self.queue.claim(timeout).await? else {
                return Ok(None);
            };
            let job_id = leased.message.job_id;

            let job = match self.jobs.get(job_id).await? {
                Some(job) => job,
                None => {
                    // message published without a job row; rebuild it from the message
                    let job = Job::with_id(job_id, leased.message.source_ref.clone(), None);
                    self.jobs.create_if_absent(&job).await?;
                    self.jobs
                        .get(job_id)
                        .await?
                        .ok_or(PipelineError::JobNotFound(job_id))?
                },
            };

            match job.status {
                JobStatus::Completed | JobStatus::DeadLettered => {
                    debug!(job_id = %job_id, status = %job.status, "Skipping message for finished job");
                    self.release_quietly(self.queue.ack(&leased.lease).await);
                },
                JobStatus::Failed => {
                    info!(job_id = %job_id, "Resuming interrupted dead-letter routing");
                    self.finish_dead_letter(job).await?;
                },
                JobStatus::Queued | JobStatus::RetryPending | JobStatus::Running => {
                    return Ok(Some(ClaimedJob {
                        job,
                        lease: leased.lease,
                        delivery_count: leased.message.delivery_count,
                    }));
                },
            }
        }
    }

    /// Claim one job and run its current stage
    pub async fn process_next(&self, timeout: Duration) -> PipelineResult<Option<StepReport>> {
        match self.claim_next(timeout).await? {
            Some(claimed) => self.run_stage(claimed).await.map(Some),
            None => Ok(None),
        }
    }

    /// Process jobs until none is claimable within `idle_timeout`
    pub async fn run_until_idle(&self, idle_timeout: Duration) -> PipelineResult<Vec<StepReport>> {
        let mut reports = Vec::new();
        while let Some(report) = self.process_next(idle_timeout).await? {
            reports.push(report);
        }
        Ok(reports)
    }

    /// Execute the claimed job's current stage and apply the outcome
    pub async fn run_stage(&self, claimed: ClaimedJob) -> PipelineResult<StepReport> {
        let ClaimedJob { job, lease, .. } = claimed;
        let stage = job.current_stage;
        let attempt_no = job.next_attempt_no();
        let span = info_span!("stage", job_id = %job.job_id, stage = %stage, attempt_no);

        async move {
            let report = |result: StepResult| StepReport {
                job_id: job.job_id,
                stage,
                attempt_no,
                result,
            };

            let mut running = job.clone();
            running.status = JobStatus::Running;
            let job = match self.jobs.commit(&running, None).await {
                Ok(job) => job,
                Err(err) if err.is_superseded() => {
                    self.release_quietly(self.queue.nack(&lease, "superseded", Duration::ZERO).await);
                    return Ok(report(StepResult::Superseded));
                },
                Err(err) => return Err(err),
            };

            let history = self.jobs.executions(job.job_id).await?;
            let ctx = StageContext::new(job.job_id, job.source_ref.clone(), stage, attempt_no, &history);
            let policy = self.config.policy(stage);
            let implementation = self.stages.get(stage)?;

            info!("Stage started");
            let started_at = Utc::now();
            let heartbeat = self.start_heartbeat_task(lease.clone());
            let outcome = match tokio::time::timeout(policy.timeout, implementation.execute(&ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => StageError::transient(format!(
                    "{} exceeded its wall-clock limit of {:?}",
                    stage, policy.timeout
                ))
                .into_outcome(),
            };
            heartbeat.abort();

            let execution = StageExecution::from_outcome(job.job_id, stage, attempt_no, started_at, &outcome);
            let result = match outcome {
                StageOutcome::Success { output_ref } => {
                    self.on_success(job, &lease, &execution, &output_ref).await?
                },
                StageOutcome::RetryableFailure { error } => {
                    self.on_retryable(job, &lease, &execution, error, &policy).await?
                },
                StageOutcome::FatalFailure { error } => {
                    error!(error = %error, "Stage failed fatally");
                    let mut failed = job;
                    failed.attempt_count += 1;
                    failed.last_error = Some(error);
                    self.dead_letter(failed, &lease, &execution).await?
                },
            };

            Ok(report(result))
        }
        .instrument(span)
        .await
    }

    async fn on_success(
        &self,
        job: Job,
        lease: &Lease,
        execution: &StageExecution,
        output_ref: &str,
    ) -> PipelineResult<StepResult> {
        let stage = job.current_stage;
        let mut advanced = job;
        advanced.attempt_count = 0;
        advanced.last_error = None;
        let next = self.plan.next(stage);
        match next {
            Some(next) => {
                advanced.current_stage = next;
                advanced.status = JobStatus::Queued;
            },
            None => advanced.status = JobStatus::Completed,
        }

        match self.jobs.commit(&advanced, Some(execution)).await {
            Ok(_) => {},
            Err(err) if err.is_superseded() => return Ok(self.superseded(lease, &err).await),
            Err(err) => return Err(err),
        }

        let elapsed_ms = (execution.ended_at - execution.started_at).num_milliseconds();
        match next {
            Some(next) => {
                info!(output_ref, elapsed_ms, next = %next, "Stage succeeded");
                self.release_quietly(self.queue.checkpoint(lease).await);
                Ok(StepResult::Advanced { next })
            },
            None => {
                info!(output_ref, elapsed_ms, "Stage succeeded, job completed");
                self.release_quietly(self.queue.ack(lease).await);
                Ok(StepResult::Completed)
            },
        }
    }

    async fn on_retryable(
        &self,
        job: Job,
        lease: &Lease,
        execution: &StageExecution,
        error: String,
        policy: &super::policy::StagePolicy,
    ) -> PipelineResult<StepResult> {
        let mut failed = job;
        failed.attempt_count += 1;
        failed.last_error = Some(error.clone());

        if failed.attempt_count >= policy.max_attempts {
            warn!(
                attempt_count = failed.attempt_count,
                max_attempts = policy.max_attempts,
                error = %error,
                "Retry budget exhausted"
            );
            return self.dead_letter(failed, lease, execution).await;
        }

        failed.status = JobStatus::RetryPending;
        let attempt_count = failed.attempt_count;
        match self.jobs.commit(&failed, Some(execution)).await {
            Ok(_) => {},
            Err(err) if err.is_superseded() => return Ok(self.superseded(lease, &err).await),
            Err(err) => return Err(err),
        }

        let delay = policy.backoff_with_jitter(attempt_count);
        warn!(
            attempt_count,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Stage failed, retry scheduled"
        );
        self.release_quietly(self.queue.nack(lease, &error, delay).await);
        Ok(StepResult::RetryScheduled {
            attempt_count,
            delay,
        })
    }

    /// Terminal failure: record it, then route the job to the dead-letter sink
    async fn dead_letter(
        &self,
        job: Job,
        lease: &Lease,
        execution: &StageExecution,
    ) -> PipelineResult<StepResult> {
        let mut failed = job;
        failed.status = JobStatus::Failed;
        let failed = match self.jobs.commit(&failed, Some(execution)).await {
            Ok(job) => job,
            Err(err) if err.is_superseded() => return Ok(self.superseded(lease, &err).await),
            Err(err) => return Err(err),
        };

        self.finish_dead_letter(failed).await?;
        Ok(StepResult::DeadLettered)
    }

    /// Second half of dead-lettering, shared with crash recovery in `claim_next`
    async fn finish_dead_letter(&self, job: Job) -> PipelineResult<()> {
        let entry = DeadLetterEntry {
            job_id: job.job_id,
            stage_name: job.current_stage,
            total_attempts: job.attempt_count,
            last_error: job
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
            created_at: Utc::now(),
        };
        self.queue.dead_letter(&entry).await?;

        let mut terminal = job;
        terminal.status = JobStatus::DeadLettered;
        match self.jobs.commit(&terminal, None).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_superseded() => {
                warn!(job_id = %terminal.job_id, error = %err, "Job changed while dead-lettering");
                Ok(())
            },
            Err(err) => Err(err),
        }
    }

    async fn superseded(&self, lease: &Lease, err: &PipelineError) -> StepResult {
        warn!(error = %err, "Job taken over by another worker, discarding result");
        // if the lease is still ours, let the record be re-read promptly
        self.release_quietly(self.queue.nack(lease, "superseded", Duration::ZERO).await);
        StepResult::Superseded
    }

    fn release_quietly(&self, result: PipelineResult<()>) {
        match result {
            Ok(()) => {},
            Err(PipelineError::LeaseLost { job_id }) => {
                debug!(job_id = %job_id, "Lease already gone when releasing message");
            },
            Err(err) => warn!(error = %err, "Failed to release queue message"),
        }
    }

    /// Renew the lease while a stage runs; stops on its own once the lease is lost
    fn start_heartbeat_task(&self, lease: Lease) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let interval = self.config.heartbeat_interval();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;
            let mut current = lease;

            loop {
                timer.tick().await;
                match queue.extend_lease(&current).await {
                    Ok(renewed) => current = renewed,
                    Err(PipelineError::LeaseLost { job_id }) => {
                        warn!(job_id = %job_id, "Lease lost while stage running; result will be discarded if superseded");
                        return;
                    },
                    Err(err) => {
                        warn!(job_id = %current.job_id, error = %err, "Failed to extend lease");
                    },
                }
            }
        })
    }
}
