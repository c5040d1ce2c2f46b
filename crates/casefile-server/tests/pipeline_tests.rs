//! End-to-end pipeline behaviour over the in-memory backends
//!
//! Covers the full five-stage run, retry budgets, fatal short-circuit,
//! crash recovery between artifacts, stage timeouts, lease takeover,
//! delivery limits, worker shutdown and operator replay.

mod common;

use async_trait::async_trait;
use casefile_server::ingest::extractor::artifacts::{decode_manifest, MANIFEST_FILE};
use casefile_server::ingest::framework::{
    CanonicalStore, JobStatus, OutcomeKind, QueueBackend, SourceRef, Stage, StageContext, StageError, StageName,
    StagingScope, StepResult,
};
use casefile_server::ingest::{standard_stages, ExtractStage, LoadStage};
use casefile_server::storage::ObjectStore;
use common::{
    fast_config, fast_policy, init_tracing, mbox, with_attachment, with_resend, TestPipeline, IDLE, THREAD_LEN,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fails the first `remaining` runs with `error`, then behaves like `inner`
struct FailFirst {
    inner: Arc<dyn Stage>,
    remaining: Arc<AtomicU32>,
    error: StageError,
}

impl FailFirst {
    fn new(inner: Arc<dyn Stage>, times: u32, error: StageError) -> Self {
        Self {
            inner,
            remaining: Arc::new(AtomicU32::new(times)),
            error,
        }
    }
}

#[async_trait]
impl Stage for FailFirst {
    fn name(&self) -> StageName {
        self.inner.name()
    }

    async fn run(&self, ctx: &StageContext) -> Result<String, StageError> {
        let failed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(self.error.clone());
        }
        self.inner.run(ctx).await
    }
}

/// Object store whose first manifest write fails, after the other artifacts landed
struct ManifestCrash {
    inner: Arc<dyn ObjectStore>,
    failures: AtomicU32,
}

#[async_trait]
impl ObjectStore for ManifestCrash {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> anyhow::Result<()> {
        if key.ends_with(MANIFEST_FILE)
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            anyhow::bail!("connection reset while writing {}", key);
        }
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.exists(key).await
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete(key).await
    }
}

/// Never finishes within any sane wall-clock limit
struct Stalled(StageName);

#[async_trait]
impl Stage for Stalled {
    fn name(&self) -> StageName {
        self.0
    }

    async fn run(&self, _ctx: &StageContext) -> Result<String, StageError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("too late".into())
    }
}

fn load_stage(backends: &casefile_server::ingest::PipelineBackends) -> Arc<dyn Stage> {
    Arc::new(LoadStage::new(
        Arc::clone(&backends.objects),
        Arc::clone(&backends.canonical),
    ))
}

#[tokio::test]
async fn test_thousand_message_archive_runs_all_stages() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let source = t.put_archive("e2e.mbox", &mbox("e2e", 1000)).await;

    let enqueued = t.pipeline.enqueue(source.clone()).await.unwrap();
    assert!(enqueued.created);

    let reports = t.run_until_idle().await;
    assert_eq!(reports.len(), 5);
    assert_eq!(reports.last().unwrap().result, StepResult::Completed);

    let job = t.pipeline.job(enqueued.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempt_count, 0);
    assert!(job.last_error.is_none());

    let history = t.pipeline.executions(enqueued.job_id).await.unwrap();
    let stages: Vec<StageName> = history.iter().map(|e| e.stage_name).collect();
    assert_eq!(stages, StageName::ALL.to_vec());
    assert!(history.iter().all(|e| e.outcome == OutcomeKind::Success));
    assert_eq!(
        history[1].output_ref.as_deref(),
        Some(format!("canonical/{}", source.content_hash).as_str())
    );

    let rows = t
        .pipeline
        .backends()
        .canonical
        .records_for_archive(&source.content_hash)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1000);
    assert!(rows.iter().all(|r| r.thread_id.is_some() && r.duplicate_of.is_none()));
    let threads: HashSet<_> = rows.iter().filter_map(|r| r.thread_id).collect();
    assert_eq!(threads.len(), 1000 / THREAD_LEN);

    let documents = t
        .pipeline
        .backends()
        .canonical
        .index_documents(&source.content_hash)
        .await
        .unwrap();
    assert_eq!(documents.len(), 1000);
    assert!(documents.iter().all(|d| d.terms.contains(&"budget".to_string())));

    let manifest_key = history[0].output_ref.clone().unwrap();
    let manifest = decode_manifest(&t.objects.get(&manifest_key).await.unwrap().unwrap()).unwrap();
    assert_eq!(manifest.record_count, 1000);
    assert_eq!(manifest.attachment_count, 0);

    // all 1000 rows went through staging, which is gone once merged
    let scope = StagingScope {
        job_id: enqueued.job_id,
        attempt_no: 1,
    };
    assert_eq!(t.canonical.merge_history().await, vec![(scope, 1000)]);
    assert_eq!(t.canonical.staging_count(scope).await.unwrap(), 0);

    assert!(t.pipeline.dead_letters().list(10).await.unwrap().is_empty());
    assert_eq!(t.pipeline.queue().depth().await.unwrap().ready, 0);
}

#[tokio::test]
async fn test_attachments_reach_the_canonical_store() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let source = t
        .put_archive("files.mbox", &with_attachment("files", mbox("files", 6)))
        .await;
    let job_id = t.pipeline.enqueue(source.clone()).await.unwrap().job_id;

    t.run_until_idle().await;
    assert_eq!(t.pipeline.job(job_id).await.unwrap().unwrap().status, JobStatus::Completed);

    let history = t.pipeline.executions(job_id).await.unwrap();
    let manifest_key = history[0].output_ref.clone().unwrap();
    let manifest = decode_manifest(&t.objects.get(&manifest_key).await.unwrap().unwrap()).unwrap();
    assert_eq!(manifest.record_count, 7);
    assert_eq!(manifest.attachment_count, 1);

    let canonical = &t.pipeline.backends().canonical;
    let attachments = canonical.attachments_for_archive(&source.content_hash).await.unwrap();
    assert_eq!(attachments.len(), 1);
    let pdf = &attachments[0];
    assert_eq!(pdf.filename, "budget.pdf");
    assert_eq!(pdf.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(pdf.size_bytes, 9);
    assert_eq!(t.objects.get(&pdf.blob_key).await.unwrap().unwrap(), b"%PDF-1.4\n");

    let rows = canonical.records_for_archive(&source.content_hash).await.unwrap();
    let parent = rows.iter().find(|r| r.record.record_id == pdf.record_id).unwrap();
    assert_eq!(parent.record.recipients_bcc.as_deref(), Some("records@example.com"));
}

#[tokio::test]
async fn test_resent_message_is_marked_duplicate_and_left_out_of_index() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let source = t
        .put_archive("resend.mbox", &with_resend("rs", mbox("rs", 8)))
        .await;

    t.pipeline.enqueue(source.clone()).await.unwrap();
    t.run_until_idle().await;

    let canonical = &t.pipeline.backends().canonical;
    let rows = canonical.records_for_archive(&source.content_hash).await.unwrap();
    assert_eq!(rows.len(), 9);

    let duplicates: Vec<_> = rows.iter().filter(|r| r.duplicate_of.is_some()).collect();
    assert_eq!(duplicates.len(), 1);
    let kept = duplicates[0].duplicate_of.unwrap();
    let original = rows.iter().find(|r| r.record.record_id == kept).unwrap();
    assert_eq!(original.record.message_id, duplicates[0].record.message_id);
    assert_eq!(original.thread_id, duplicates[0].thread_id);

    let documents = canonical.index_documents(&source.content_hash).await.unwrap();
    assert_eq!(documents.len(), 8);
}

#[tokio::test]
async fn test_reenqueue_of_completed_archive_is_a_no_op() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let source = t.put_archive("again.mbox", &mbox("again", 12)).await;

    let first = t.pipeline.enqueue(source.clone()).await.unwrap();
    t.run_until_idle().await;

    let second = t.pipeline.enqueue(source.clone()).await.unwrap();
    assert_eq!(second.job_id, first.job_id);
    assert!(!second.created);
    assert!(t.run_until_idle().await.is_empty());
    assert_eq!(t.pipeline.executions(first.job_id).await.unwrap().len(), 5);
    assert_eq!(t.canonical.total_records().await, 12);
}

#[tokio::test]
async fn test_concurrent_enqueue_creates_one_job() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let source = t.put_archive("race.mbox", &mbox("race", 4)).await;

    let attempts = (0..16).map(|_| {
        let pipeline = Arc::clone(&t.pipeline);
        let source = source.clone();
        tokio::spawn(async move { pipeline.enqueue(source).await })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|e| e.created).count(), 1);
    let ids: HashSet<_> = results.iter().map(|e| e.job_id).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(t.queue.depth().await.unwrap().ready, 1);
}

#[tokio::test]
async fn test_retryable_failures_within_budget_recover() {
    init_tracing();
    let t = TestPipeline::with_stages(fast_config(), |config, backends| {
        standard_stages(config, backends).with(Arc::new(FailFirst::new(
            load_stage(backends),
            2,
            StageError::transient("connection refused"),
        )))
    });
    let source = t.put_archive("flaky.mbox", &mbox("flaky", 8)).await;
    let job_id = t.pipeline.enqueue(source).await.unwrap().job_id;

    let reports = t.run_until_idle().await;
    assert!(matches!(
        reports[1].result,
        StepResult::RetryScheduled { attempt_count: 1, .. }
    ));

    let job = t.pipeline.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let loads: Vec<_> = t
        .pipeline
        .executions(job_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.stage_name == StageName::Load)
        .collect();
    let outcomes: Vec<_> = loads.iter().map(|e| (e.attempt_no, e.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            (1, OutcomeKind::RetryableFailure),
            (2, OutcomeKind::RetryableFailure),
            (3, OutcomeKind::Success),
        ]
    );
    assert_eq!(loads[0].error_detail.as_deref(), Some("transient I/O error: connection refused"));
}

#[tokio::test]
async fn test_exhausted_retry_budget_dead_letters() {
    init_tracing();
    let config = fast_config().with_policy(StageName::Thread, fast_policy(3));
    let t = TestPipeline::with_stages(config, |config, backends| {
        let thread: Arc<dyn Stage> = Arc::new(casefile_server::ingest::ThreadStage::new(Arc::clone(
            &backends.canonical,
        )));
        standard_stages(config, backends).with(Arc::new(FailFirst::new(
            thread,
            u32::MAX,
            StageError::ResourceExhaustion("out of memory".into()),
        )))
    });
    let source = t.put_archive("doomed.mbox", &mbox("doomed", 4)).await;
    let job_id = t.pipeline.enqueue(source).await.unwrap().job_id;

    let reports = t.run_until_idle().await;
    assert_eq!(reports.last().unwrap().result, StepResult::DeadLettered);

    let threads: Vec<_> = t
        .pipeline
        .executions(job_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.stage_name == StageName::Thread)
        .collect();
    assert_eq!(threads.len(), 3);
    assert!(threads.iter().all(|e| e.outcome == OutcomeKind::RetryableFailure));

    let job = t.pipeline.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::DeadLettered);
    assert_eq!(job.current_stage, StageName::Thread);

    let entry = t.pipeline.dead_letters().get(job_id).await.unwrap().unwrap();
    assert_eq!(entry.stage_name, StageName::Thread);
    assert_eq!(entry.total_attempts, 3);
    assert!(entry.last_error.contains("out of memory"));
    assert!(t.queue.message(job_id).await.is_none());
}

#[tokio::test]
async fn test_stage_timeout_counts_as_retryable_then_dead_letters() {
    init_tracing();
    let mut policy = fast_policy(2);
    policy.timeout = Duration::from_millis(50);
    let config = fast_config().with_policy(StageName::Thread, policy);
    let t = TestPipeline::with_stages(config, |config, backends| {
        standard_stages(config, backends).with(Arc::new(Stalled(StageName::Thread)))
    });
    let source = t.put_archive("slow.mbox", &mbox("slow", 4)).await;
    let job_id = t.pipeline.enqueue(source).await.unwrap().job_id;

    let reports = t.run_until_idle().await;
    assert_eq!(reports.last().unwrap().result, StepResult::DeadLettered);

    let history = t.pipeline.executions(job_id).await.unwrap();
    let outcomes: Vec<_> = history.iter().map(|e| (e.stage_name, e.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            (StageName::Extract, OutcomeKind::Success),
            (StageName::Load, OutcomeKind::Success),
            (StageName::Thread, OutcomeKind::RetryableFailure),
            (StageName::Thread, OutcomeKind::RetryableFailure),
        ]
    );
    assert!(history[2]
        .error_detail
        .as_deref()
        .unwrap()
        .contains("wall-clock limit"));
    // the limit cut the run short
    assert!((history[2].ended_at - history[2].started_at).num_seconds() < 5);

    let job = t.pipeline.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::DeadLettered);
    let entry = t.pipeline.dead_letters().get(job_id).await.unwrap().unwrap();
    assert_eq!(entry.stage_name, StageName::Thread);
    assert_eq!(entry.total_attempts, 2);
}

#[tokio::test]
async fn test_fatal_failure_skips_retries() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let archive = mbox("corrupt", 4);
    let stored = t.put_archive("corrupt.mbox", &archive).await;
    // right location, wrong hash
    let source = SourceRef::new(stored.location, "f".repeat(64));
    let job_id = t.pipeline.enqueue(source).await.unwrap().job_id;

    let reports = t.run_until_idle().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result, StepResult::DeadLettered);

    let history = t.pipeline.executions(job_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, OutcomeKind::FatalFailure);

    let entry = t.pipeline.dead_letters().get(job_id).await.unwrap().unwrap();
    assert_eq!(entry.stage_name, StageName::Extract);
    assert_eq!(entry.total_attempts, 1);
    assert!(entry.last_error.contains("corrupt input"));
}

#[tokio::test]
async fn test_crash_before_manifest_never_exposes_partial_extraction() {
    init_tracing();
    let t = TestPipeline::with_stages(fast_config(), |config, backends| {
        let store: Arc<dyn ObjectStore> = Arc::new(ManifestCrash {
            inner: Arc::clone(&backends.objects),
            failures: AtomicU32::new(1),
        });
        standard_stages(config, backends)
            .with(Arc::new(ExtractStage::new(store, config.extractor_version.clone())))
    });
    let source = t.put_archive("crash.mbox", &mbox("crash", 20)).await;
    let job_id = t.pipeline.enqueue(source).await.unwrap().job_id;

    t.run_until_idle().await;

    let history = t.pipeline.executions(job_id).await.unwrap();
    assert_eq!(history[0].outcome, OutcomeKind::RetryableFailure);
    assert_eq!(history[1].outcome, OutcomeKind::Success);
    assert_eq!(history[1].attempt_no, 2);

    // attempt 1 left data files but no commit marker
    let first_attempt = t.objects.list(&format!("extract/{job_id}/attempt-1/")).await.unwrap();
    assert!(!first_attempt.is_empty());
    assert!(first_attempt.iter().all(|k| !k.ends_with(MANIFEST_FILE)));

    // the loader read the committed attempt only
    let manifest_key = history[1].output_ref.clone().unwrap();
    assert!(manifest_key.contains("attempt-2"));
    assert_eq!(t.pipeline.job(job_id).await.unwrap().unwrap().status, JobStatus::Completed);
    assert_eq!(t.canonical.total_records().await, 20);
}

#[tokio::test]
async fn test_stale_worker_result_is_discarded() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let source = t.put_archive("zombie.mbox", &mbox("zombie", 4)).await;
    let job_id = t.pipeline.enqueue(source).await.unwrap().job_id;
    let orchestrator = t.pipeline.orchestrator();

    let stale = orchestrator.claim_next(IDLE).await.unwrap().unwrap();
    t.queue.expire_lease(job_id).await;

    let fresh = orchestrator.claim_next(IDLE).await.unwrap().unwrap();
    assert_eq!(fresh.delivery_count, 2);
    let report = orchestrator.run_stage(fresh).await.unwrap();
    assert_eq!(report.result, StepResult::Advanced { next: StageName::Load });

    let report = orchestrator.run_stage(stale).await.unwrap();
    assert_eq!(report.result, StepResult::Superseded);

    let history = t.pipeline.executions(job_id).await.unwrap();
    assert_eq!(history.len(), 1);
    let job = t.pipeline.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.current_stage, StageName::Load);

    t.run_until_idle().await;
    let job = t.pipeline.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(t.pipeline.executions(job_id).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_max_deliveries_routes_to_dead_letter() {
    init_tracing();
    let mut config = fast_config();
    config.max_deliveries = 2;
    let t = TestPipeline::new(config);
    let source = t.put_archive("poison.mbox", &mbox("poison", 4)).await;
    let job_id = t.pipeline.enqueue(source).await.unwrap().job_id;
    let orchestrator = t.pipeline.orchestrator();

    // two workers die holding the lease without finishing a stage
    for _ in 0..2 {
        assert!(orchestrator.claim_next(IDLE).await.unwrap().is_some());
        t.queue.expire_lease(job_id).await;
    }
    assert!(orchestrator.claim_next(IDLE).await.unwrap().is_none());

    let entry = t.pipeline.dead_letters().get(job_id).await.unwrap().unwrap();
    assert_eq!(entry.stage_name, StageName::Extract);
    assert_eq!(entry.total_attempts, 2);
    assert!(entry.last_error.contains("max deliveries"));

    let job = t.pipeline.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::DeadLettered);
    assert!(t.queue.message(job_id).await.is_none());
}

#[tokio::test]
async fn test_replay_starts_fresh_job_and_keeps_entry() {
    init_tracing();
    let mut load = None;
    let t = TestPipeline::with_stages(fast_config(), |config, backends| {
        let stage = FailFirst::new(
            load_stage(backends),
            1,
            StageError::validation("staged rows missing required fields", false),
        );
        load = Some(Arc::clone(&stage.remaining));
        standard_stages(config, backends).with(Arc::new(stage))
    });
    let source = t.put_archive("replay.mbox", &mbox("replay", 8)).await;
    let original = t.pipeline.enqueue(source).await.unwrap().job_id;

    t.run_until_idle().await;
    let entry = t.pipeline.dead_letters().get(original).await.unwrap().unwrap();
    assert_eq!(entry.stage_name, StageName::Load);
    assert_eq!(load.unwrap().load(Ordering::SeqCst), 0);

    let replay = t.pipeline.dead_letters().replay(original).await.unwrap();
    assert!(replay.created);
    assert_ne!(replay.job_id, original);

    let again = t.pipeline.dead_letters().replay(original).await.unwrap();
    assert_eq!(again.job_id, replay.job_id);
    assert!(!again.created);

    t.run_until_idle().await;

    let replayed = t.pipeline.job(replay.job_id).await.unwrap().unwrap();
    assert_eq!(replayed.status, JobStatus::Completed);
    assert_eq!(replayed.replay_of, Some(original));

    // the dead-lettered job and its entry are untouched
    assert_eq!(t.pipeline.dead_letters().get(original).await.unwrap(), Some(entry));
    let old = t.pipeline.job(original).await.unwrap().unwrap();
    assert_eq!(old.status, JobStatus::DeadLettered);
    assert_eq!(t.canonical.total_records().await, 8);
}

#[tokio::test]
async fn test_replay_of_unknown_entry_fails() {
    let t = TestPipeline::new(fast_config());
    let err = t
        .pipeline
        .dead_letters()
        .replay(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        casefile_server::ingest::framework::PipelineError::DeadLetterNotFound(_)
    ));
}

#[tokio::test]
async fn test_worker_pool_processes_stages_in_order() {
    init_tracing();
    let t = TestPipeline::new(fast_config());

    let mut job_ids = Vec::new();
    for n in 0..6 {
        let tag = format!("pool{n}");
        let source = t.put_archive(&format!("{tag}.mbox"), &mbox(&tag, 16 + n)).await;
        job_ids.push(t.pipeline.enqueue(source).await.unwrap().job_id);
    }

    let shutdown = CancellationToken::new();
    let handles = t.pipeline.worker_pool(shutdown.clone()).spawn();

    let all_done = async {
        loop {
            let mut done = 0;
            for id in &job_ids {
                if t.pipeline.job(*id).await.unwrap().unwrap().status == JobStatus::Completed {
                    done += 1;
                }
            }
            if done == job_ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(30), all_done)
        .await
        .expect("all jobs complete");

    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }

    for id in &job_ids {
        let history = t.pipeline.executions(*id).await.unwrap();
        let stages: Vec<_> = history.iter().map(|e| e.stage_name).collect();
        assert_eq!(stages, StageName::ALL.to_vec());
        for pair in history.windows(2) {
            assert!(pair[0].ended_at <= pair[1].started_at);
        }
    }
    assert_eq!(t.canonical.total_records().await, (0..6).map(|n| 16 + n).sum::<usize>());
}

#[tokio::test]
async fn test_cancelled_worker_pool_leaves_queue_untouched() {
    init_tracing();
    let t = TestPipeline::new(fast_config());
    let source = t.put_archive("idle.mbox", &mbox("idle", 4)).await;
    let job_id = t.pipeline.enqueue(source).await.unwrap().job_id;

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let handles = t.pipeline.worker_pool(shutdown).spawn();
    for handle in handles {
        handle.await.unwrap();
    }

    // no lease was taken and then abandoned
    let depth = t.queue.depth().await.unwrap();
    assert_eq!(depth.ready, 1);
    assert_eq!(depth.leased, 0);
    assert_eq!(t.queue.message(job_id).await.unwrap().delivery_count, 0);
    assert!(t.pipeline.executions(job_id).await.unwrap().is_empty());
    assert_eq!(t.pipeline.job(job_id).await.unwrap().unwrap().status, JobStatus::Queued);
}
