//! Conversation threading
//!
//! Records are linked through `In-Reply-To` and `References` to Message-IDs
//! present in the same archive. Each connected group is a thread whose id is
//! derived from its root message, so recomputation yields the same ids.

use async_trait::async_trait;
use casefile_common::checksum::stable_uuid;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::archive_rows;
use crate::ingest::framework::{CanonicalStore, Stage, StageContext, StageError, StageName};
use crate::ingest::records::{normalize_message_id, CanonicalRecord};

pub struct ThreadStage {
    canonical: Arc<dyn CanonicalStore>,
}

impl ThreadStage {
    pub fn new(canonical: Arc<dyn CanonicalStore>) -> Self {
        Self { canonical }
    }
}

#[async_trait]
impl Stage for ThreadStage {
    fn name(&self) -> StageName {
        StageName::Thread
    }

    async fn run(&self, ctx: &StageContext) -> Result<String, StageError> {
        let archive_hash = &ctx.source_ref.content_hash;
        let rows = archive_rows(self.canonical.as_ref(), ctx).await?;

        let assignments = assign_threads(archive_hash, &rows);
        let threads = {
            let mut ids: Vec<Uuid> = assignments.iter().map(|(_, t)| *t).collect();
            ids.sort_unstable();
            ids.dedup();
            ids.len()
        };
        self.canonical.apply_threads(archive_hash, &assignments).await?;

        info!(job_id = %ctx.job_id, records = rows.len(), threads, "Threads assigned");
        Ok(format!("threads/{archive_hash}"))
    }
}

/// Disjoint sets over row positions
struct Components {
    parent: Vec<usize>,
}

impl Components {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // lower position wins so the result does not depend on link order
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[drop] = keep;
        }
    }
}

/// Thread id for every row of one archive
pub fn assign_threads(archive_hash: &str, rows: &[CanonicalRecord]) -> Vec<(Uuid, Uuid)> {
    let mut by_message_id: HashMap<String, usize> = HashMap::new();
    for (pos, row) in rows.iter().enumerate() {
        if let Some(id) = row.record.message_id.as_deref().map(normalize_message_id) {
            if !id.is_empty() {
                by_message_id.entry(id).or_insert(pos);
            }
        }
    }

    let mut components = Components::new(rows.len());
    for (pos, row) in rows.iter().enumerate() {
        for parent in row.record.parent_ids() {
            if let Some(&target) = by_message_id.get(&parent) {
                components.union(pos, target);
            }
        }
    }

    // Thread root: earliest sent message, record id breaking ties
    let mut roots: HashMap<usize, usize> = HashMap::new();
    for pos in 0..rows.len() {
        let group = components.find(pos);
        let candidate = roots.entry(group).or_insert(pos);
        if root_order(&rows[pos]) < root_order(&rows[*candidate]) {
            *candidate = pos;
        }
    }

    (0..rows.len())
        .map(|pos| {
            let group = components.find(pos);
            let root = &rows[roots[&group]].record;
            let identity = root
                .message_id
                .as_deref()
                .map(normalize_message_id)
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| root.record_id.to_string());
            (
                rows[pos].record.record_id,
                stable_uuid(&format!("thread|{archive_hash}|{identity}")),
            )
        })
        .collect()
}

fn root_order(row: &CanonicalRecord) -> (i64, Uuid) {
    (row.record.sent_at_epoch.unwrap_or(i64::MAX), row.record.record_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::framework::memory::InMemoryCanonicalStore;
    use crate::ingest::framework::{SourceRef, StagingScope};
    use crate::ingest::records::fixtures::record;

    fn row(n: usize, reply_to: Option<usize>) -> CanonicalRecord {
        let mut r = record("abc", n);
        r.in_reply_to = reply_to.map(|p| format!("<m{p}@example.com>"));
        CanonicalRecord::from_staged(r)
    }

    fn thread_of(assignments: &[(Uuid, Uuid)], row: &CanonicalRecord) -> Uuid {
        assignments
            .iter()
            .find(|(id, _)| *id == row.record.record_id)
            .map(|(_, t)| *t)
            .unwrap()
    }

    #[test]
    fn test_replies_share_root_thread() {
        let rows = vec![row(0, None), row(1, Some(0)), row(2, Some(1)), row(3, None)];
        let assignments = assign_threads("abc", &rows);
        assert_eq!(assignments.len(), 4);

        let root_thread = thread_of(&assignments, &rows[0]);
        assert_eq!(thread_of(&assignments, &rows[1]), root_thread);
        assert_eq!(thread_of(&assignments, &rows[2]), root_thread);
        assert_ne!(thread_of(&assignments, &rows[3]), root_thread);
        assert_eq!(root_thread, stable_uuid("thread|abc|m0@example.com"));
    }

    #[test]
    fn test_assignment_ignores_row_order() {
        let rows = vec![row(0, None), row(1, Some(0)), row(2, Some(1))];
        let mut reversed = rows.clone();
        reversed.reverse();

        let mut forward = assign_threads("abc", &rows);
        let mut backward = assign_threads("abc", &reversed);
        forward.sort();
        backward.sort();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_unknown_parent_leaves_singleton() {
        let rows = vec![row(0, Some(99))];
        let assignments = assign_threads("abc", &rows);
        assert_eq!(assignments[0].1, stable_uuid("thread|abc|m0@example.com"));
    }

    #[tokio::test]
    async fn test_stage_overwrites_threads() {
        let canonical = Arc::new(InMemoryCanonicalStore::new());
        let scope = StagingScope {
            job_id: Uuid::nil(),
            attempt_no: 1,
        };
        let records: Vec<_> = (0..3).map(|n| row(n, n.checked_sub(1)).record).collect();
        canonical.replace_staging(scope, &records).await.unwrap();
        canonical.merge_staging(scope).await.unwrap();

        let ctx = StageContext::new(
            Uuid::nil(),
            SourceRef::new("mem://a", "abc"),
            StageName::Thread,
            1,
            &[],
        );
        let stage = ThreadStage::new(canonical.clone());
        stage.run(&ctx).await.unwrap();
        let first = canonical.records_for_archive("abc").await.unwrap();
        stage.run(&ctx).await.unwrap();
        let second = canonical.records_for_archive("abc").await.unwrap();

        assert_eq!(first, second);
        assert!(first.iter().all(|r| r.thread_id == first[0].thread_id && r.thread_id.is_some()));
    }

    #[tokio::test]
    async fn test_empty_archive_is_structural() {
        let canonical = Arc::new(InMemoryCanonicalStore::new());
        let ctx = StageContext::new(
            Uuid::nil(),
            SourceRef::new("mem://a", "abc"),
            StageName::Thread,
            1,
            &[],
        );
        let err = ThreadStage::new(canonical).run(&ctx).await.unwrap_err();
        assert!(matches!(err, StageError::Structural(_)));
    }
}
