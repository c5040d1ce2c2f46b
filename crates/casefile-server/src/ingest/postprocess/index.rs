use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use super::archive_rows;
use crate::ingest::framework::{CanonicalStore, Stage, StageContext, StageError, StageName};
use crate::ingest::records::{CanonicalRecord, IndexDocument};

/// Upper bound on distinct terms kept per document
pub const MAX_TERMS: usize = 256;

/// Builds one search document per non-duplicate row, replacing the archive's
/// previous documents wholesale
pub struct IndexStage {
    canonical: Arc<dyn CanonicalStore>,
}

impl IndexStage {
    pub fn new(canonical: Arc<dyn CanonicalStore>) -> Self {
        Self { canonical }
    }
}

#[async_trait]
impl Stage for IndexStage {
    fn name(&self) -> StageName {
        StageName::Index
    }

    async fn run(&self, ctx: &StageContext) -> Result<String, StageError> {
        let archive_hash = &ctx.source_ref.content_hash;
        let rows = archive_rows(self.canonical.as_ref(), ctx).await?;

        let documents = build_documents(&rows);
        let written = self.canonical.replace_index(archive_hash, &documents).await?;

        info!(job_id = %ctx.job_id, records = rows.len(), documents = written, "Index rebuilt");
        Ok(format!("index/{archive_hash}"))
    }
}

pub fn build_documents(rows: &[CanonicalRecord]) -> Vec<IndexDocument> {
    rows.iter()
        .filter(|row| row.duplicate_of.is_none())
        .map(|row| {
            let record = &row.record;
            IndexDocument {
                record_id: record.record_id,
                archive_hash: record.archive_hash.clone(),
                thread_id: row.thread_id,
                subject: record.subject.clone(),
                sender: record.sender_email.clone().or_else(|| record.sender_name.clone()),
                sent_at_epoch: record.sent_at_epoch,
                preview: row.body_preview.clone(),
                terms: terms(
                    [record.subject.as_deref(), row.body_preview.as_deref()]
                        .into_iter()
                        .flatten(),
                ),
            }
        })
        .collect()
}

/// Lowercase alphanumeric tokens of two or more chars, unique and sorted
pub fn terms<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for text in texts {
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if token.chars().count() >= 2 {
                set.insert(token.to_lowercase());
            }
        }
    }
    set.into_iter().take(MAX_TERMS).collect()
}
