//! Process-local implementations of the pipeline stores
//!
//! Same contracts as the Postgres backends, held behind `tokio::sync` locks.
//! Used by tests and by `PIPELINE_BACKEND=memory` for local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::dead_letter::DeadLetterSink;
use super::error::{PipelineError, PipelineResult};
use super::queue::QueueBackend;
use super::store::{CanonicalStore, JobStore, StagingScope};
use super::types::{
    DeadLetterEntry, Job, JobStatus, Lease, LeasedJob, QueueDepth, QueueMessage, StageExecution,
};
use crate::ingest::records::{AttachmentRecord, CanonicalRecord, EmailRecord, IndexDocument};

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(365))
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, Clone)]
struct Slot {
    message: QueueMessage,
    visible_at: DateTime<Utc>,
    lease: Option<Lease>,
    seq: u64,
}

impl Slot {
    fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease.as_ref().is_some_and(|l| l.expires_at > now)
    }

    fn holds(&self, lease: &Lease, now: DateTime<Utc>) -> bool {
        self.lease
            .as_ref()
            .is_some_and(|l| l.token == lease.token && l.expires_at > now)
    }
}

#[derive(Default)]
pub struct InMemoryQueue {
    slots: Mutex<HashMap<Uuid, Slot>>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current message for a job, for inspection in tests
    pub async fn message(&self, job_id: Uuid) -> Option<QueueMessage> {
        self.slots.lock().await.get(&job_id).map(|s| s.message.clone())
    }

    /// Expire the lease on a job immediately, as if its worker had died
    pub async fn expire_lease(&self, job_id: Uuid) {
        if let Some(slot) = self.slots.lock().await.get_mut(&job_id) {
            if let Some(lease) = slot.lease.as_mut() {
                lease.expires_at = Utc::now() - chrono::Duration::milliseconds(1);
            }
        }
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn publish(&self, message: QueueMessage) -> PipelineResult<bool> {
        let mut slots = self.slots.lock().await;
        if slots.contains_key(&message.job_id) {
            return Ok(false);
        }
        let seq = self
            .next_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        slots.insert(
            message.job_id,
            Slot {
                message,
                visible_at: Utc::now(),
                lease: None,
                seq,
            },
        );
        Ok(true)
    }

    async fn receive(&self, lease_for: Duration) -> PipelineResult<Option<LeasedJob>> {
        let now = Utc::now();
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots
            .values_mut()
            .filter(|s| s.visible_at <= now && !s.is_leased(now))
            .min_by_key(|s| (s.visible_at, s.seq))
        else {
            return Ok(None);
        };

        let lease = Lease {
            job_id: slot.message.job_id,
            token: Uuid::new_v4(),
            expires_at: after(now, lease_for),
        };
        slot.message.delivery_count += 1;
        slot.lease = Some(lease.clone());

        Ok(Some(LeasedJob {
            message: slot.message.clone(),
            lease,
        }))
    }

    async fn extend(&self, lease: &Lease, lease_for: Duration) -> PipelineResult<Lease> {
        let now = Utc::now();
        let mut slots = self.slots.lock().await;
        match slots.get_mut(&lease.job_id) {
            Some(slot) if slot.holds(lease, now) => {
                let renewed = Lease {
                    expires_at: after(now, lease_for),
                    ..lease.clone()
                };
                slot.lease = Some(renewed.clone());
                Ok(renewed)
            },
            _ => Err(PipelineError::LeaseLost {
                job_id: lease.job_id,
            }),
        }
    }

    async fn ack(&self, lease: &Lease) -> PipelineResult<()> {
        let now = Utc::now();
        let mut slots = self.slots.lock().await;
        match slots.get(&lease.job_id) {
            Some(slot) if slot.holds(lease, now) => {
                slots.remove(&lease.job_id);
                Ok(())
            },
            _ => Err(PipelineError::LeaseLost {
                job_id: lease.job_id,
            }),
        }
    }

    async fn release(&self, lease: &Lease, delay: Duration, reset_deliveries: bool) -> PipelineResult<()> {
        let now = Utc::now();
        let mut slots = self.slots.lock().await;
        match slots.get_mut(&lease.job_id) {
            Some(slot) if slot.holds(lease, now) => {
                slot.lease = None;
                slot.visible_at = after(now, delay);
                if reset_deliveries {
                    slot.message.delivery_count = 0;
                }
                Ok(())
            },
            _ => Err(PipelineError::LeaseLost {
                job_id: lease.job_id,
            }),
        }
    }

    async fn remove(&self, job_id: Uuid) -> PipelineResult<()> {
        self.slots.lock().await.remove(&job_id);
        Ok(())
    }

    async fn depth(&self) -> PipelineResult<QueueDepth> {
        let now = Utc::now();
        let slots = self.slots.lock().await;
        let mut depth = QueueDepth::default();
        for slot in slots.values() {
            if slot.is_leased(now) {
                depth.leased += 1;
            } else if slot.visible_at > now {
                depth.delayed += 1;
            } else {
                depth.ready += 1;
            }
        }
        Ok(depth)
    }
}

// ============================================================================
// Job store
// ============================================================================

#[derive(Default)]
struct JobTables {
    jobs: HashMap<Uuid, Job>,
    executions: HashMap<Uuid, Vec<StageExecution>>,
}

#[derive(Default)]
pub struct InMemoryJobStore {
    tables: RwLock<JobTables>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_if_absent(&self, job: &Job) -> PipelineResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.jobs.contains_key(&job.job_id) {
            return Ok(false);
        }
        tables.jobs.insert(job.job_id, job.clone());
        Ok(true)
    }

    async fn get(&self, job_id: Uuid) -> PipelineResult<Option<Job>> {
        Ok(self.tables.read().await.jobs.get(&job_id).cloned())
    }

    async fn commit(&self, job: &Job, execution: Option<&StageExecution>) -> PipelineResult<Job> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .jobs
            .get(&job.job_id)
            .ok_or(PipelineError::JobNotFound(job.job_id))?;
        if stored.version != job.version {
            return Err(PipelineError::VersionConflict {
                job_id: job.job_id,
                expected: job.version,
            });
        }

        let mut updated = job.clone();
        updated.version += 1;
        updated.updated_at = Utc::now();
        tables.jobs.insert(job.job_id, updated.clone());
        if let Some(execution) = execution {
            tables
                .executions
                .entry(job.job_id)
                .or_default()
                .push(execution.clone());
        }
        Ok(updated)
    }

    async fn executions(&self, job_id: Uuid) -> PipelineResult<Vec<StageExecution>> {
        Ok(self
            .tables
            .read()
            .await
            .executions
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list(&self, status: Option<JobStatus>, limit: usize) -> PipelineResult<Vec<Job>> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.job_id.cmp(&b.job_id)));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

// ============================================================================
// Dead-letter sink
// ============================================================================

#[derive(Default)]
pub struct InMemoryDeadLetterSink {
    entries: RwLock<Vec<DeadLetterEntry>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn append(&self, entry: &DeadLetterEntry) -> PipelineResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.job_id == entry.job_id) {
            return Ok(false);
        }
        entries.push(entry.clone());
        Ok(true)
    }

    async fn list(&self, limit: usize) -> PipelineResult<Vec<DeadLetterEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }

    async fn get(&self, job_id: Uuid) -> PipelineResult<Option<DeadLetterEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|e| e.job_id == job_id).cloned())
    }
}

// ============================================================================
// Canonical storage
// ============================================================================

#[derive(Default)]
struct CanonicalTables {
    staging: HashMap<StagingScope, Vec<EmailRecord>>,
    attachment_staging: HashMap<StagingScope, Vec<AttachmentRecord>>,
    records: BTreeMap<Uuid, CanonicalRecord>,
    attachments: BTreeMap<Uuid, AttachmentRecord>,
    index: HashMap<String, Vec<IndexDocument>>,
    merges: Vec<(StagingScope, u64)>,
}

#[derive(Default)]
pub struct InMemoryCanonicalStore {
    tables: RwLock<CanonicalTables>,
}

impl InMemoryCanonicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total canonical rows across all archives
    pub async fn total_records(&self) -> usize {
        self.tables.read().await.records.len()
    }

    /// Every committed merge in order, with the rows staged for it
    pub async fn merge_history(&self) -> Vec<(StagingScope, u64)> {
        self.tables.read().await.merges.clone()
    }
}

#[async_trait]
impl CanonicalStore for InMemoryCanonicalStore {
    async fn replace_staging(&self, scope: StagingScope, rows: &[EmailRecord]) -> PipelineResult<u64> {
        let mut tables = self.tables.write().await;
        tables.staging.insert(scope, rows.to_vec());
        Ok(rows.len() as u64)
    }

    async fn staging_count(&self, scope: StagingScope) -> PipelineResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables.staging.get(&scope).map_or(0, |rows| rows.len() as u64))
    }

    async fn staged_rows(&self, scope: StagingScope) -> PipelineResult<Vec<EmailRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.staging.get(&scope).cloned().unwrap_or_default())
    }

    async fn replace_attachment_staging(
        &self,
        scope: StagingScope,
        rows: &[AttachmentRecord],
    ) -> PipelineResult<u64> {
        let mut tables = self.tables.write().await;
        tables.attachment_staging.insert(scope, rows.to_vec());
        Ok(rows.len() as u64)
    }

    async fn attachment_staging_count(&self, scope: StagingScope) -> PipelineResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .attachment_staging
            .get(&scope)
            .map_or(0, |rows| rows.len() as u64))
    }

    async fn merge_staging(&self, scope: StagingScope) -> PipelineResult<u64> {
        let mut tables = self.tables.write().await;
        let staged = tables.staging.remove(&scope).unwrap_or_default();
        let staged_attachments = tables.attachment_staging.remove(&scope).unwrap_or_default();
        for row in &staged {
            let merged = match tables.records.get(&row.record_id) {
                Some(existing) => CanonicalRecord {
                    body_preview: row.body_preview(),
                    record: row.clone(),
                    thread_id: existing.thread_id,
                    duplicate_of: existing.duplicate_of,
                },
                None => CanonicalRecord::from_staged(row.clone()),
            };
            tables.records.insert(row.record_id, merged);
        }
        for attachment in staged_attachments {
            tables.attachments.insert(attachment.attachment_id, attachment);
        }
        tables.merges.push((scope, staged.len() as u64));
        Ok(staged.len() as u64)
    }

    async fn clear_staging(&self, scope: StagingScope) -> PipelineResult<u64> {
        let mut tables = self.tables.write().await;
        let rows = tables.staging.remove(&scope).map_or(0, |rows| rows.len());
        let attachments = tables
            .attachment_staging
            .remove(&scope)
            .map_or(0, |rows| rows.len());
        Ok((rows + attachments) as u64)
    }

    async fn records_for_archive(&self, archive_hash: &str) -> PipelineResult<Vec<CanonicalRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .values()
            .filter(|r| r.record.archive_hash == archive_hash)
            .cloned()
            .collect())
    }

    async fn record_count(&self, archive_hash: &str) -> PipelineResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .values()
            .filter(|r| r.record.archive_hash == archive_hash)
            .count() as u64)
    }

    async fn attachments_for_archive(&self, archive_hash: &str) -> PipelineResult<Vec<AttachmentRecord>> {
        let tables = self.tables.read().await;
        let mut attachments: Vec<AttachmentRecord> = tables
            .attachments
            .values()
            .filter(|a| a.archive_hash == archive_hash)
            .cloned()
            .collect();
        attachments.sort_by_key(|a| (a.record_id, a.part_index));
        Ok(attachments)
    }

    async fn apply_threads(&self, archive_hash: &str, assignments: &[(Uuid, Uuid)]) -> PipelineResult<u64> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for (record_id, thread_id) in assignments {
            if let Some(row) = tables.records.get_mut(record_id) {
                if row.record.archive_hash == archive_hash {
                    row.thread_id = Some(*thread_id);
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn apply_duplicates(
        &self,
        archive_hash: &str,
        assignments: &[(Uuid, Option<Uuid>)],
    ) -> PipelineResult<u64> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for (record_id, duplicate_of) in assignments {
            if let Some(row) = tables.records.get_mut(record_id) {
                if row.record.archive_hash == archive_hash {
                    row.duplicate_of = *duplicate_of;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn replace_index(&self, archive_hash: &str, documents: &[IndexDocument]) -> PipelineResult<u64> {
        let mut tables = self.tables.write().await;
        tables
            .index
            .insert(archive_hash.to_string(), documents.to_vec());
        Ok(documents.len() as u64)
    }

    async fn index_documents(&self, archive_hash: &str) -> PipelineResult<Vec<IndexDocument>> {
        let tables = self.tables.read().await;
        Ok(tables.index.get(archive_hash).cloned().unwrap_or_default())
    }
}
