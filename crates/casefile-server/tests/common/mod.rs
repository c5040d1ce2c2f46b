//! Shared harness for casefile server integration tests
//!
//! - In-memory pipeline assembly with handles on the concrete stores
//! - Synthetic mbox archives
//! - PostgreSQL testcontainer with migrations applied

#![allow(dead_code)]

use anyhow::{Context, Result};
use casefile_common::checksum::sha256_hex;
use casefile_server::ingest::framework::memory::{
    InMemoryCanonicalStore, InMemoryDeadLetterSink, InMemoryJobStore, InMemoryQueue,
};
use casefile_server::ingest::framework::{SourceRef, StagePolicy, StageSet};
use casefile_server::ingest::{standard_stages, Pipeline, PipelineBackend, PipelineBackends, PipelineConfig};
use casefile_server::storage::{InMemoryObjectStore, ObjectStore};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

/// How long `run_until_idle` waits for more work before returning
pub const IDLE: Duration = Duration::from_millis(150);

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,casefile_server=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Millisecond backoff with no jitter so retries happen within a test
pub fn fast_policy(max_attempts: u32) -> StagePolicy {
    StagePolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: 0.0,
        timeout: Duration::from_secs(30),
    }
}

pub fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default().with_uniform_policy(fast_policy(3));
    config.backend = PipelineBackend::Memory;
    config.worker_count = 4;
    config.lease_duration = Duration::from_secs(30);
    config.claim_timeout = Duration::from_millis(100);
    config.poll_interval = Duration::from_millis(2);
    config
}

/// An in-memory pipeline plus typed handles on its stores
pub struct TestPipeline {
    pub pipeline: Arc<Pipeline>,
    pub queue: Arc<InMemoryQueue>,
    pub jobs: Arc<InMemoryJobStore>,
    pub dead_letters: Arc<InMemoryDeadLetterSink>,
    pub canonical: Arc<InMemoryCanonicalStore>,
    pub objects: Arc<InMemoryObjectStore>,
}

impl TestPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_stages(config, standard_stages)
    }

    /// Build with custom stages; `stages` sees the backends the pipeline will use
    pub fn with_stages(
        config: PipelineConfig,
        stages: impl FnOnce(&PipelineConfig, &PipelineBackends) -> StageSet,
    ) -> Self {
        let queue = Arc::new(InMemoryQueue::new());
        let jobs = Arc::new(InMemoryJobStore::new());
        let dead_letters = Arc::new(InMemoryDeadLetterSink::new());
        let canonical = Arc::new(InMemoryCanonicalStore::new());
        let objects = Arc::new(InMemoryObjectStore::new());

        let backends = PipelineBackends {
            queue: queue.clone(),
            jobs: jobs.clone(),
            dead_letters: dead_letters.clone(),
            canonical: canonical.clone(),
            objects: objects.clone(),
        };
        let stage_set = stages(&config, &backends);
        let pipeline = Pipeline::with_stages(config, backends, stage_set).expect("pipeline assembles");

        Self {
            pipeline: Arc::new(pipeline),
            queue,
            jobs,
            dead_letters,
            canonical,
            objects,
        }
    }

    /// Store `data` as an archive and return its source ref
    pub async fn put_archive(&self, name: &str, data: &[u8]) -> SourceRef {
        put_archive(self.objects.as_ref(), name, data).await
    }

    pub async fn run_until_idle(&self) -> Vec<casefile_server::ingest::framework::StepReport> {
        self.pipeline
            .orchestrator()
            .run_until_idle(IDLE)
            .await
            .expect("orchestrator runs")
    }
}

pub async fn put_archive(store: &dyn ObjectStore, name: &str, data: &[u8]) -> SourceRef {
    let key = format!("archives/{name}");
    store
        .put(&key, data.to_vec(), Some("application/mbox"))
        .await
        .expect("archive stored");
    SourceRef::new(format!("mem://{key}"), sha256_hex(data))
}

// ============================================================================
// Synthetic archives
// ============================================================================

/// Messages per conversation in [`mbox`] archives
pub const THREAD_LEN: usize = 4;

/// An mbox archive of `count` messages.
///
/// Messages come in conversations of [`THREAD_LEN`]: each message after the
/// first replies to its predecessor. `tag` keeps Message-IDs of different
/// archives apart.
pub fn mbox(tag: &str, count: usize) -> Vec<u8> {
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .expect("valid base date");
    let mut out = String::new();

    for i in 0..count {
        let sent = base + ChronoDuration::minutes(i as i64);
        let conversation = i / THREAD_LEN;
        out.push_str(&format!("From sender{}@example.com {}\n", i % 7, sent.format("%a %b %e %H:%M:%S %Y")));
        out.push_str(&format!("Message-ID: <{tag}-{i}@example.com>\n"));
        out.push_str(&format!("From: Person {} <person{}@example.com>\n", i % 7, i % 7));
        out.push_str("To: team@example.com\n");
        out.push_str(&format!("Subject: Quarterly topic {conversation}\n"));
        out.push_str(&format!("Date: {}\n", sent.to_rfc2822()));
        if i % THREAD_LEN != 0 {
            out.push_str(&format!("In-Reply-To: <{tag}-{}@example.com>\n", i - 1));
        }
        out.push('\n');
        out.push_str(&format!("Message number {i} about budget item {}.\n", i % 13));
        out.push_str("Regards\n\n");
    }

    out.into_bytes()
}

/// Appends a resend of message 0 under the same Message-ID
pub fn with_resend(tag: &str, mut archive: Vec<u8>) -> Vec<u8> {
    let resend = format!(
        "From sender0@example.com Mon Jan  1 09:00:00 2024\n\
         Message-ID: <{tag}-0@example.com>\n\
         From: Person 0 <person0@example.com>\n\
         To: team@example.com\n\
         Subject: Quarterly topic 0\n\
         Date: Mon, 1 Jan 2024 09:00:00 +0000\n\
         \n\
         Message number 0 about budget item 0, sent again.\n\n"
    );
    archive.extend_from_slice(resend.as_bytes());
    archive
}

/// Appends a message carrying one base64 PDF attachment.
///
/// The attachment decodes to `%PDF-1.4\n`.
pub fn with_attachment(tag: &str, mut archive: Vec<u8>) -> Vec<u8> {
    let message = format!(
        "From sender0@example.com Mon Jan  1 08:00:00 2024\n\
         Message-ID: <{tag}-files@example.com>\n\
         From: Person 0 <person0@example.com>\n\
         To: team@example.com\n\
         Bcc: records@example.com\n\
         Subject: Signed budget\n\
         Date: Mon, 1 Jan 2024 08:00:00 +0000\n\
         MIME-Version: 1.0\n\
         Content-Type: multipart/mixed; boundary=\"part\"\n\
         \n\
         --part\n\
         Content-Type: text/plain\n\
         \n\
         Signed budget attached.\n\
         --part\n\
         Content-Type: application/pdf; name=\"budget.pdf\"\n\
         Content-Disposition: attachment; filename=\"budget.pdf\"\n\
         Content-Transfer-Encoding: base64\n\
         \n\
         JVBERi0xLjQK\n\
         --part--\n\n"
    );
    archive.extend_from_slice(message.as_bytes());
    archive
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    /// Start PostgreSQL 16 with migrations applied
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .context("Failed to get container port")?;
        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        casefile_server::db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}
