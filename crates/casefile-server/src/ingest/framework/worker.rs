//! Worker pool driving the orchestrator
//!
//! Each worker loops claim -> run one stage. Shutdown is observed only
//! between claims; a stage in flight runs to completion or is abandoned to
//! lease expiry if the process dies.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::orchestrator::Orchestrator;

/// Pause after an unexpected error before claiming again
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    worker_count: usize,
    claim_timeout: Duration,
    shutdown: CancellationToken,
    hostname: String,
}

impl WorkerPool {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        worker_count: usize,
        claim_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            worker_count,
            claim_timeout,
            shutdown,
            hostname: hostname::get()
                .unwrap_or_else(|_| "unknown".into())
                .to_string_lossy()
                .to_string(),
        }
    }

    /// Spawn the workers; they stop once the shutdown token is cancelled
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        info!(
            workers = self.worker_count,
            hostname = %self.hostname,
            "Starting pipeline workers"
        );

        (0..self.worker_count)
            .map(|index| {
                let worker_id = format!("{}-{}-{}", self.hostname, index, &Uuid::new_v4().simple().to_string()[..8]);
                let orchestrator = self.orchestrator.clone();
                let shutdown = self.shutdown.clone();
                let claim_timeout = self.claim_timeout;
                let span = info_span!("worker", worker_id = %worker_id);
                tokio::spawn(worker_loop(orchestrator, claim_timeout, shutdown).instrument(span))
            })
            .collect()
    }
}

async fn worker_loop(orchestrator: Arc<Orchestrator>, claim_timeout: Duration, shutdown: CancellationToken) {
    debug!("Worker started");

    // A claim is never raced against shutdown: dropping it after the receive
    // would strand a leased message until its lease expires.
    while !shutdown.is_cancelled() {
        match orchestrator.claim_next(claim_timeout).await {
            Ok(Some(job)) => {
                if let Err(err) = orchestrator.run_stage(job).await {
                    error!(error = %err, "Stage bookkeeping failed; job will be redelivered");
                    sleep_or_shutdown(&shutdown).await;
                }
            },
            Ok(None) => {},
            Err(err) => {
                error!(error = %err, "Failed to claim job");
                sleep_or_shutdown(&shutdown).await;
            },
        }
    }

    debug!("Worker stopped");
}

async fn sleep_or_shutdown(shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {},
        _ = tokio::time::sleep(ERROR_BACKOFF) => {},
    }
}
