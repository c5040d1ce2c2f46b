//! Extract stage
//!
//! Fetches the source archive, checks it against its content hash, parses it
//! and commits the attempt's artifacts with the manifest written last. Attachment
//! content goes to the object store first, then the message and attachment
//! exports. The stage output is the manifest key; nothing else signals a
//! finished extraction.

pub mod artifacts;
pub mod parser;

use async_trait::async_trait;
use casefile_common::checksum::sha256_hex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::ingest::framework::{
    Manifest, Stage, StageContext, StageError, StageName, SCHEMA_VERSION,
};
use crate::storage::ObjectStore;

pub use artifacts::{
    artifact_key, attachment_blob_key, attempt_prefix, ATTACHMENTS_FILE, ATTACHMENT_EVENTS_FILE,
    EVENTS_FILE, MANIFEST_FILE, RECORDS_FILE,
};
pub use parser::{ArchiveParser, AttachmentPart, MboxArchiveParser, ParsedMessage};

pub struct ExtractStage {
    store: Arc<dyn ObjectStore>,
    parser: Arc<dyn ArchiveParser>,
    extractor_version: String,
}

impl ExtractStage {
    pub fn new(store: Arc<dyn ObjectStore>, extractor_version: impl Into<String>) -> Self {
        Self {
            store,
            parser: Arc::new(MboxArchiveParser::new()),
            extractor_version: extractor_version.into(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ArchiveParser>) -> Self {
        self.parser = parser;
        self
    }

    /// A readable manifest already committed for this attempt
    async fn committed_manifest(&self, manifest_key: &str) -> Result<Option<Manifest>, StageError> {
        let Some(data) = self.store.get(manifest_key).await.map_err(|e| StageError::io(&e))? else {
            return Ok(None);
        };
        match artifacts::decode_manifest(&data) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(err) => {
                warn!(manifest_key, error = %err, "Ignoring unreadable manifest, extracting again");
                Ok(None)
            },
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), StageError> {
        self.store
            .put(key, data, Some(content_type))
            .await
            .map_err(|e| StageError::io(&e))
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> StageName {
        StageName::Extract
    }

    async fn run(&self, ctx: &StageContext) -> Result<String, StageError> {
        let prefix = attempt_prefix(ctx.job_id, ctx.attempt_no);
        let manifest_key = artifact_key(&prefix, MANIFEST_FILE);

        if let Some(manifest) = self.committed_manifest(&manifest_key).await? {
            info!(
                job_id = %ctx.job_id,
                attempt = ctx.attempt_no,
                records = manifest.record_count,
                "Extraction already committed for this attempt"
            );
            return Ok(manifest_key);
        }

        let started = Instant::now();
        let source = &ctx.source_ref;
        let archive_key = self.store.key_for_location(&source.location);
        let archive = self
            .store
            .get(&archive_key)
            .await
            .map_err(|e| StageError::io(&e))?
            .ok_or_else(|| {
                StageError::transient(format!("source archive {} not found", source.location))
            })?;

        let actual_hash = sha256_hex(&archive);
        if actual_hash != source.content_hash {
            return Err(StageError::CorruptInput(format!(
                "archive {} hashes to {}, expected {}",
                source.location, actual_hash, source.content_hash
            )));
        }
        debug!(job_id = %ctx.job_id, bytes = archive.len(), format = self.parser.format(), "Parsing archive");

        let parser = Arc::clone(&self.parser);
        let archive_hash = source.content_hash.clone();
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&archive_hash, &archive))
            .await
            .map_err(|e| StageError::transient(format!("parser task failed: {e}")))??;

        let mut records = Vec::with_capacity(parsed.len());
        let mut attachments = Vec::new();
        for message in parsed {
            let record_id = message.record.record_id;
            for part in message.attachments {
                let attachment =
                    part.to_record(&message.record, |id| attachment_blob_key(&prefix, record_id, id));
                let content_type = attachment
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream");
                self.put(&attachment.blob_key, part.content, content_type).await?;
                attachments.push(attachment);
            }
            records.push(message.record);
        }
        if records.is_empty() {
            return Err(StageError::CorruptInput(format!(
                "archive {} produced no records",
                source.location
            )));
        }

        let events = artifacts::encode_events(&records).map_err(|e| StageError::io(&e))?;
        let table = artifacts::encode_records(&records).map_err(|e| StageError::io(&e))?;
        let attachment_events = artifacts::encode_events(&attachments).map_err(|e| StageError::io(&e))?;
        let attachment_table = artifacts::encode_attachments(&attachments).map_err(|e| StageError::io(&e))?;

        let mut output_checksums = BTreeMap::new();
        output_checksums.insert(EVENTS_FILE.to_string(), sha256_hex(&events));
        output_checksums.insert(RECORDS_FILE.to_string(), sha256_hex(&table));
        output_checksums.insert(ATTACHMENT_EVENTS_FILE.to_string(), sha256_hex(&attachment_events));
        output_checksums.insert(ATTACHMENTS_FILE.to_string(), sha256_hex(&attachment_table));

        self.put(&artifact_key(&prefix, EVENTS_FILE), events, "application/gzip").await?;
        self.put(&artifact_key(&prefix, RECORDS_FILE), table, "application/gzip").await?;
        self.put(&artifact_key(&prefix, ATTACHMENT_EVENTS_FILE), attachment_events, "application/gzip")
            .await?;
        self.put(&artifact_key(&prefix, ATTACHMENTS_FILE), attachment_table, "application/gzip")
            .await?;

        let manifest = Manifest {
            record_count: records.len() as u64,
            attachment_count: attachments.len() as u64,
            output_checksums,
            elapsed_ms: started.elapsed().as_millis() as u64,
            extractor_version: self.extractor_version.clone(),
            schema_version: SCHEMA_VERSION.to_string(),
        };
        let manifest_bytes = artifacts::encode_manifest(&manifest).map_err(|e| StageError::io(&e))?;
        self.put(&manifest_key, manifest_bytes, "application/json").await?;

        info!(
            job_id = %ctx.job_id,
            attempt = ctx.attempt_no,
            records = manifest.record_count,
            attachments = manifest.attachment_count,
            elapsed_ms = manifest.elapsed_ms,
            "Extraction committed"
        );
        Ok(manifest_key)
    }
}
