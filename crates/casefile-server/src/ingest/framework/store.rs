//! Persistence contracts for job state and canonical storage

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::PipelineResult;
use super::types::{Job, JobStatus, StageExecution};
use crate::ingest::records::{AttachmentRecord, CanonicalRecord, EmailRecord, IndexDocument};

/// Durable, lease-independent record of every job and its execution history.
///
/// Owned by the orchestrator: stages never write here.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert `job` unless a job with the same id exists. Returns true if inserted.
    async fn create_if_absent(&self, job: &Job) -> PipelineResult<bool>;

    async fn get(&self, job_id: Uuid) -> PipelineResult<Option<Job>>;

    /// Compare-and-swap write of `job`.
    ///
    /// Succeeds only if the stored version equals `job.version`; the stored row
    /// then carries `job.version + 1`. When `execution` is given it is appended
    /// in the same atomic step, so a rejected commit leaves no trace.
    async fn commit(&self, job: &Job, execution: Option<&StageExecution>) -> PipelineResult<Job>;

    /// Execution history in append order
    async fn executions(&self, job_id: Uuid) -> PipelineResult<Vec<StageExecution>>;

    /// Most recently updated jobs first
    async fn list(&self, status: Option<JobStatus>, limit: usize) -> PipelineResult<Vec<Job>>;
}

/// Staging rows written by one loader attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagingScope {
    pub job_id: Uuid,
    pub attempt_no: u32,
}

impl std::fmt::Display for StagingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/attempt-{}", self.job_id, self.attempt_no)
    }
}

/// Staging area plus the validated, queryable record store.
///
/// Every write is safe to apply twice: staging is replaced per scope, merges
/// upsert by record identity, and post-processing writes overwrite. Staging
/// holds rows only while a load attempt is in flight.
#[async_trait]
pub trait CanonicalStore: Send + Sync {
    /// Replace all staging rows of `scope` with `rows`; returns rows staged
    async fn replace_staging(&self, scope: StagingScope, rows: &[EmailRecord]) -> PipelineResult<u64>;

    async fn staging_count(&self, scope: StagingScope) -> PipelineResult<u64>;

    async fn staged_rows(&self, scope: StagingScope) -> PipelineResult<Vec<EmailRecord>>;

    /// Replace all staged attachments of `scope` with `rows`; returns rows staged
    async fn replace_attachment_staging(
        &self,
        scope: StagingScope,
        rows: &[AttachmentRecord],
    ) -> PipelineResult<u64>;

    async fn attachment_staging_count(&self, scope: StagingScope) -> PipelineResult<u64>;

    /// Upsert every staged row and attachment of `scope` into canonical storage
    /// and drop the scope's staging, in one transaction. Returns rows merged.
    async fn merge_staging(&self, scope: StagingScope) -> PipelineResult<u64>;

    /// Drop the staged rows and attachments of `scope`; returns rows removed
    async fn clear_staging(&self, scope: StagingScope) -> PipelineResult<u64>;

    /// Canonical rows of one archive ordered by record id
    async fn records_for_archive(&self, archive_hash: &str) -> PipelineResult<Vec<CanonicalRecord>>;

    async fn record_count(&self, archive_hash: &str) -> PipelineResult<u64>;

    /// Canonical attachments of one archive ordered by record, then part
    async fn attachments_for_archive(&self, archive_hash: &str) -> PipelineResult<Vec<AttachmentRecord>>;

    /// Overwrite thread ids for the given records of `archive_hash`
    async fn apply_threads(&self, archive_hash: &str, assignments: &[(Uuid, Uuid)]) -> PipelineResult<u64>;

    /// Overwrite duplicate markers for the given records of `archive_hash`
    async fn apply_duplicates(
        &self,
        archive_hash: &str,
        assignments: &[(Uuid, Option<Uuid>)],
    ) -> PipelineResult<u64>;

    /// Replace the archive's index documents with `documents` atomically
    async fn replace_index(&self, archive_hash: &str, documents: &[IndexDocument]) -> PipelineResult<u64>;

    async fn index_documents(&self, archive_hash: &str) -> PipelineResult<Vec<IndexDocument>>;
}
