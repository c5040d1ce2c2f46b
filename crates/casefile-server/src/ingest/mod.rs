//! Mailbox archive ingestion
//!
//! # Architecture
//!
//! - **framework**: queue adapter, stage contract, orchestrator, dead-letter sink, workers
//! - **extractor**: archive -> event log, tabular export, manifest
//! - **loader**: manifest -> staging -> validated merge into canonical storage
//! - **postprocess**: thread, dedupe and index over canonical rows
//! - **config**: retry, backoff, lease and timeout policy (`PIPELINE_*` environment variables)
//!
//! # Public API
//!
//! The HTTP surface lives in `features::jobs` and `features::dead_letters`:
//! - `POST /api/v1/jobs` - Enqueue an archive
//! - `GET /api/v1/jobs/:job_id` - Job status
//! - `GET /api/v1/jobs/:job_id/executions` - Stage execution history
//! - `GET /api/v1/dead-letters` - Dead-lettered jobs
//! - `POST /api/v1/dead-letters/:job_id/replay` - Replay as a fresh job

pub mod config;
pub mod extractor;
pub mod framework;
pub mod loader;
pub mod postprocess;
pub mod records;

use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use config::{PipelineBackend, PipelineConfig};
pub use extractor::ExtractStage;
pub use loader::LoadStage;
pub use postprocess::{DedupeStage, IndexStage, ThreadStage};

use crate::db::{PgCanonicalStore, PgDeadLetterSink, PgJobStore, PgQueueBackend};
use crate::storage::ObjectStore;
use framework::memory::{InMemoryCanonicalStore, InMemoryDeadLetterSink, InMemoryJobStore, InMemoryQueue};
use framework::{
    CanonicalStore, DeadLetterSink, DeadLetters, Enqueued, Job, JobQueueAdapter, JobStatus, JobStore,
    Orchestrator, PipelineResult, QueueBackend, SourceRef, StageExecution, StageSet, WorkerPool,
};

/// Storage the pipeline runs against
#[derive(Clone)]
pub struct PipelineBackends {
    pub queue: Arc<dyn QueueBackend>,
    pub jobs: Arc<dyn JobStore>,
    pub dead_letters: Arc<dyn DeadLetterSink>,
    pub canonical: Arc<dyn CanonicalStore>,
    pub objects: Arc<dyn ObjectStore>,
}

impl PipelineBackends {
    pub fn postgres(pool: PgPool, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            queue: Arc::new(PgQueueBackend::new(pool.clone())),
            jobs: Arc::new(PgJobStore::new(pool.clone())),
            dead_letters: Arc::new(PgDeadLetterSink::new(pool.clone())),
            canonical: Arc::new(PgCanonicalStore::new(pool)),
            objects,
        }
    }

    pub fn in_memory(objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            queue: Arc::new(InMemoryQueue::new()),
            jobs: Arc::new(InMemoryJobStore::new()),
            dead_letters: Arc::new(InMemoryDeadLetterSink::new()),
            canonical: Arc::new(InMemoryCanonicalStore::new()),
            objects,
        }
    }
}

/// extract, load, thread, dedupe and index over the given backends
pub fn standard_stages(config: &PipelineConfig, backends: &PipelineBackends) -> StageSet {
    StageSet::new()
        .with(Arc::new(ExtractStage::new(
            Arc::clone(&backends.objects),
            config.extractor_version.clone(),
        )))
        .with(Arc::new(LoadStage::new(
            Arc::clone(&backends.objects),
            Arc::clone(&backends.canonical),
        )))
        .with(Arc::new(ThreadStage::new(Arc::clone(&backends.canonical))))
        .with(Arc::new(DedupeStage::new(Arc::clone(&backends.canonical))))
        .with(Arc::new(IndexStage::new(Arc::clone(&backends.canonical))))
}

/// The assembled pipeline: what the API and the workers share
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    backends: PipelineBackends,
    queue: Arc<JobQueueAdapter>,
    orchestrator: Arc<Orchestrator>,
    dead_letters: DeadLetters,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, backends: PipelineBackends) -> PipelineResult<Self> {
        let stages = standard_stages(&config, &backends);
        Self::with_stages(config, backends, stages)
    }

    /// Assemble with custom stage implementations
    pub fn with_stages(
        config: PipelineConfig,
        backends: PipelineBackends,
        stages: StageSet,
    ) -> PipelineResult<Self> {
        let config = Arc::new(config);
        let queue = Arc::new(JobQueueAdapter::new(
            Arc::clone(&backends.queue),
            Arc::clone(&backends.jobs),
            Arc::clone(&backends.dead_letters),
            &config,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&queue),
            Arc::clone(&backends.jobs),
            stages,
            Arc::clone(&config),
        )?);
        let dead_letters = DeadLetters::new(
            Arc::clone(&backends.dead_letters),
            Arc::clone(&backends.jobs),
            Arc::clone(&queue),
        );

        Ok(Self {
            config,
            backends,
            queue,
            orchestrator,
            dead_letters,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backends(&self) -> &PipelineBackends {
        &self.backends
    }

    pub fn queue(&self) -> &Arc<JobQueueAdapter> {
        &self.queue
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn dead_letters(&self) -> &DeadLetters {
        &self.dead_letters
    }

    pub async fn enqueue(&self, source_ref: SourceRef) -> PipelineResult<Enqueued> {
        self.queue.enqueue(source_ref).await
    }

    pub async fn job(&self, job_id: Uuid) -> PipelineResult<Option<Job>> {
        self.backends.jobs.get(job_id).await
    }

    /// Most recently updated first
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> PipelineResult<Vec<Job>> {
        self.backends.jobs.list(status, limit).await
    }

    pub async fn executions(&self, job_id: Uuid) -> PipelineResult<Vec<StageExecution>> {
        self.backends.jobs.executions(job_id).await
    }

    /// Worker pool sized from config, stopped by `shutdown`
    pub fn worker_pool(&self, shutdown: CancellationToken) -> WorkerPool {
        WorkerPool::new(
            Arc::clone(&self.orchestrator),
            self.config.worker_count,
            self.config.claim_timeout,
            shutdown,
        )
    }
}
