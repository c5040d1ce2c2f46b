//! Duplicate detection
//!
//! Rows that share a dedupe key point at the lowest record id of their group.
//! Rows are marked, never deleted.

use async_trait::async_trait;
use casefile_common::checksum::sha256_hex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::archive_rows;
use crate::ingest::framework::{CanonicalStore, Stage, StageContext, StageError, StageName};
use crate::ingest::records::{normalize_message_id, CanonicalRecord};

pub struct DedupeStage {
    canonical: Arc<dyn CanonicalStore>,
}

impl DedupeStage {
    pub fn new(canonical: Arc<dyn CanonicalStore>) -> Self {
        Self { canonical }
    }
}

#[async_trait]
impl Stage for DedupeStage {
    fn name(&self) -> StageName {
        StageName::Dedupe
    }

    async fn run(&self, ctx: &StageContext) -> Result<String, StageError> {
        let archive_hash = &ctx.source_ref.content_hash;
        let rows = archive_rows(self.canonical.as_ref(), ctx).await?;

        let assignments = find_duplicates(&rows);
        let duplicates = assignments.iter().filter(|(_, of)| of.is_some()).count();
        self.canonical.apply_duplicates(archive_hash, &assignments).await?;

        info!(job_id = %ctx.job_id, records = rows.len(), duplicates, "Duplicates marked");
        Ok(format!("dedupe/{archive_hash}"))
    }
}

/// Normalized Message-ID, or a content fingerprint for messages without one
pub fn dedupe_key(row: &CanonicalRecord) -> String {
    let record = &row.record;
    match record.message_id.as_deref().map(normalize_message_id) {
        Some(id) if !id.is_empty() => format!("mid:{id}"),
        _ => {
            let fingerprint = format!(
                "{}|{}|{}|{}",
                record.sender_email.as_deref().unwrap_or_default().to_ascii_lowercase(),
                record.sent_at_epoch.map(|t| t.to_string()).unwrap_or_default(),
                record.subject.as_deref().unwrap_or_default().trim(),
                record.body_hash,
            );
            format!("content:{}", sha256_hex(fingerprint.as_bytes()))
        },
    }
}

/// `(record_id, duplicate_of)` for every row; `None` marks the kept row
pub fn find_duplicates(rows: &[CanonicalRecord]) -> Vec<(Uuid, Option<Uuid>)> {
    let mut groups: BTreeMap<String, Vec<Uuid>> = BTreeMap::new();
    for row in rows {
        groups.entry(dedupe_key(row)).or_default().push(row.record.record_id);
    }

    let mut assignments = Vec::with_capacity(rows.len());
    for mut ids in groups.into_values() {
        ids.sort_unstable();
        let keep = ids[0];
        assignments.extend(
            ids.into_iter()
                .map(|id| (id, (id != keep).then_some(keep))),
        );
    }
    assignments.sort_unstable();
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::records::fixtures::record;

    fn row(n: usize) -> CanonicalRecord {
        CanonicalRecord::from_staged(record("abc", n))
    }

    #[test]
    fn test_same_message_id_is_duplicate_of_lowest_id() {
        let mut rows = vec![row(0), row(1), row(2)];
        rows[2].record.message_id = Some("<M0@EXAMPLE.COM>".into());

        let assignments = find_duplicates(&rows);
        let keep = rows[0].record.record_id.min(rows[2].record.record_id);
        let dup = rows[0].record.record_id.max(rows[2].record.record_id);

        assert!(assignments.contains(&(keep, None)));
        assert!(assignments.contains(&(dup, Some(keep))));
        assert!(assignments.contains(&(rows[1].record.record_id, None)));
        assert_eq!(assignments.len(), 3);
    }

    #[test]
    fn test_content_fingerprint_without_message_id() {
        let mut a = row(0);
        let mut b = row(1);
        for r in [&mut a, &mut b] {
            r.record.message_id = None;
            r.record.subject = Some("same".into());
            r.record.sent_at_epoch = Some(1);
            r.record.body_hash = "f".repeat(64);
        }
        assert_eq!(dedupe_key(&a), dedupe_key(&b));

        b.record.body_hash = "e".repeat(64);
        assert_ne!(dedupe_key(&a), dedupe_key(&b));
    }

    #[test]
    fn test_distinct_rows_are_all_kept() {
        let rows: Vec<_> = (0..20).map(row).collect();
        assert!(find_duplicates(&rows).iter().all(|(_, of)| of.is_none()));
    }
}
