//! Load stage
//!
//! Copies a committed extraction into a staging area scoped to the job and
//! attempt, validates it, then merges it into canonical storage in a single
//! transaction keyed by record identity. Canonical storage is untouched when
//! validation fails, and the scope's staging rows are dropped either way.

use async_trait::async_trait;
use casefile_common::checksum::verify_sha256;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ingest::extractor::artifacts::{self, prefix_of_manifest, ATTACHMENTS_FILE, RECORDS_FILE};
use crate::ingest::framework::{
    CanonicalStore, Manifest, Stage, StageContext, StageError, StageName, StagingScope, SCHEMA_VERSION,
};
use crate::ingest::records::{AttachmentRecord, EmailRecord};
use crate::storage::ObjectStore;

pub struct LoadStage {
    store: Arc<dyn ObjectStore>,
    canonical: Arc<dyn CanonicalStore>,
}

impl LoadStage {
    pub fn new(store: Arc<dyn ObjectStore>, canonical: Arc<dyn CanonicalStore>) -> Self {
        Self { store, canonical }
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StageError> {
        self.store
            .get(key)
            .await
            .map_err(|e| StageError::io(&e))?
            .ok_or_else(|| StageError::transient(format!("artifact {key} not found")))
    }

    /// Fetch `file` from the attempt and check it against the manifest checksum
    async fn fetch_verified(&self, prefix: &str, file: &str, checksum: &str) -> Result<Vec<u8>, StageError> {
        let data = self.fetch(&artifacts::artifact_key(prefix, file)).await?;
        verify_sha256(&data, checksum).map_err(|e| StageError::validation(format!("{file}: {e}"), true))?;
        Ok(data)
    }

    async fn read_attachments(&self, prefix: &str, manifest: &Manifest) -> Result<Vec<AttachmentRecord>, StageError> {
        match manifest.output_checksums.get(ATTACHMENTS_FILE) {
            Some(checksum) => {
                artifacts::decode_attachments(&self.fetch_verified(prefix, ATTACHMENTS_FILE, checksum).await?)
            },
            None if manifest.attachment_count == 0 => Ok(Vec::new()),
            None => Err(StageError::Structural(format!(
                "manifest counts {} attachments but has no checksum for {ATTACHMENTS_FILE}",
                manifest.attachment_count
            ))),
        }
    }

    async fn stage_and_merge(
        &self,
        scope: StagingScope,
        manifest: &Manifest,
        rows: &[EmailRecord],
        attachments: &[AttachmentRecord],
    ) -> Result<u64, StageError> {
        self.canonical.replace_staging(scope, rows).await?;
        self.canonical.replace_attachment_staging(scope, attachments).await?;

        let staged = self.canonical.staging_count(scope).await?;
        if staged != manifest.record_count {
            return Err(StageError::validation(
                format!(
                    "staged {} rows for {}, manifest records {}",
                    staged, scope, manifest.record_count
                ),
                true,
            ));
        }
        let staged_attachments = self.canonical.attachment_staging_count(scope).await?;
        if staged_attachments != manifest.attachment_count {
            return Err(StageError::validation(
                format!(
                    "staged {} attachments for {}, manifest attachments {}",
                    staged_attachments, scope, manifest.attachment_count
                ),
                true,
            ));
        }

        let staged_rows = self.canonical.staged_rows(scope).await?;
        let incomplete: Vec<String> = staged_rows
            .iter()
            .filter_map(|row| {
                let missing = row.missing_required();
                (!missing.is_empty()).then(|| format!("{} ({})", row.source_path, missing.join(", ")))
            })
            .take(5)
            .collect();
        if !incomplete.is_empty() {
            return Err(StageError::validation(
                format!("rows missing required fields: {}", incomplete.join("; ")),
                false,
            ));
        }
        debug!(%scope, rows = staged, attachments = staged_attachments, "Staging validated");

        Ok(self.canonical.merge_staging(scope).await?)
    }

    async fn discard_staging(&self, scope: StagingScope) {
        if let Err(err) = self.canonical.clear_staging(scope).await {
            warn!(%scope, error = %err, "Failed to clear staging after a failed load");
        }
    }
}

/// Output reference of a successful load
pub fn canonical_ref(archive_hash: &str) -> String {
    format!("canonical/{archive_hash}")
}

/// Attachments must be complete and belong to a message of the same export
fn check_attachments(rows: &[EmailRecord], attachments: &[AttachmentRecord]) -> Result<(), StageError> {
    let record_ids: HashSet<_> = rows.iter().map(|r| r.record_id).collect();
    let broken: Vec<String> = attachments
        .iter()
        .filter_map(|a| {
            let mut problems = a.missing_required();
            if !record_ids.contains(&a.record_id) {
                problems.push("unknown record_id");
            }
            (!problems.is_empty()).then(|| format!("{} ({})", a.attachment_id, problems.join(", ")))
        })
        .take(5)
        .collect();
    if broken.is_empty() {
        Ok(())
    } else {
        Err(StageError::validation(
            format!("attachments failed validation: {}", broken.join("; ")),
            false,
        ))
    }
}

#[async_trait]
impl Stage for LoadStage {
    fn name(&self) -> StageName {
        StageName::Load
    }

    async fn run(&self, ctx: &StageContext) -> Result<String, StageError> {
        let manifest_key = ctx.output_of(StageName::Extract)?;
        let prefix = prefix_of_manifest(manifest_key).ok_or_else(|| {
            StageError::Structural(format!("{manifest_key} is not a manifest key"))
        })?;

        let manifest = artifacts::decode_manifest(&self.fetch(manifest_key).await?)?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(StageError::Structural(format!(
                "manifest schema version {} written by {} is not supported (expected {})",
                manifest.schema_version, manifest.extractor_version, SCHEMA_VERSION
            )));
        }

        let expected_checksum = manifest.output_checksums.get(RECORDS_FILE).ok_or_else(|| {
            StageError::Structural(format!("manifest has no checksum for {RECORDS_FILE}"))
        })?;
        let rows = artifacts::decode_records(&self.fetch_verified(prefix, RECORDS_FILE, expected_checksum).await?)?;
        let attachments = self.read_attachments(prefix, &manifest).await?;

        let archive_hash = &ctx.source_ref.content_hash;
        if let Some(foreign) = rows.iter().find(|r| &r.archive_hash != archive_hash) {
            return Err(StageError::Structural(format!(
                "record {} belongs to archive {}",
                foreign.record_id, foreign.archive_hash
            )));
        }
        if let Some(foreign) = attachments.iter().find(|a| &a.archive_hash != archive_hash) {
            return Err(StageError::Structural(format!(
                "attachment {} belongs to archive {}",
                foreign.attachment_id, foreign.archive_hash
            )));
        }
        check_attachments(&rows, &attachments)?;

        let scope = StagingScope {
            job_id: ctx.job_id,
            attempt_no: ctx.attempt_no,
        };
        let merged = match self.stage_and_merge(scope, &manifest, &rows, &attachments).await {
            Ok(merged) => merged,
            Err(err) => {
                self.discard_staging(scope).await;
                return Err(err);
            },
        };
        info!(
            job_id = %ctx.job_id,
            attempt = ctx.attempt_no,
            merged,
            attachments = attachments.len(),
            "Merged staging into canonical storage"
        );
        Ok(canonical_ref(archive_hash))
    }
}
