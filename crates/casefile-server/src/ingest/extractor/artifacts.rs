//! Extraction artifact layout and codecs
//!
//! Every extraction attempt owns the key prefix
//! `extract/<job_id>/attempt-<n>/` and writes, in order:
//!
//! - `attachments/<record_id>/<attachment_id>` - decoded attachment content
//! - `events.ndjson.gz` - one `{seq, record}` line per parsed message
//! - `records.csv.gz` - the flattened export the loader bulk-copies
//! - `attachments.ndjson.gz`, `attachments.csv.gz` - the same pair for attachment metadata
//! - `manifest.json` - the commit marker, always last

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use uuid::Uuid;

use crate::ingest::framework::{Manifest, StageError};
use crate::ingest::records::{AttachmentRecord, EmailRecord};

pub const EVENTS_FILE: &str = "events.ndjson.gz";
pub const RECORDS_FILE: &str = "records.csv.gz";
pub const ATTACHMENT_EVENTS_FILE: &str = "attachments.ndjson.gz";
pub const ATTACHMENTS_FILE: &str = "attachments.csv.gz";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Header row of `records.csv.gz`, in column order
pub const RECORD_COLUMNS: [&str; 16] = [
    "record_id",
    "archive_hash",
    "source_path",
    "message_id",
    "in_reply_to",
    "references_header",
    "subject",
    "sender_email",
    "sender_name",
    "recipients_to",
    "recipients_cc",
    "recipients_bcc",
    "sent_at_epoch",
    "body_text",
    "body_html",
    "body_hash",
];

/// Header row of `attachments.csv.gz`, in column order
pub const ATTACHMENT_COLUMNS: [&str; 11] = [
    "attachment_id",
    "record_id",
    "archive_hash",
    "part_index",
    "filename",
    "content_type",
    "size_bytes",
    "content_hash",
    "is_inline",
    "content_id",
    "blob_key",
];

pub fn attempt_prefix(job_id: Uuid, attempt_no: u32) -> String {
    format!("extract/{job_id}/attempt-{attempt_no}")
}

pub fn artifact_key(prefix: &str, file: &str) -> String {
    format!("{prefix}/{file}")
}

pub fn attachment_blob_key(prefix: &str, record_id: Uuid, attachment_id: Uuid) -> String {
    format!("{prefix}/attachments/{record_id}/{attachment_id}")
}

/// Prefix of the attempt a manifest key belongs to
pub fn prefix_of_manifest(manifest_key: &str) -> Option<&str> {
    manifest_key.strip_suffix(&format!("/{MANIFEST_FILE}"))
}

#[derive(Serialize)]
struct EventLine<'a, T> {
    seq: u64,
    record: &'a T,
}

/// Gzip NDJSON, one `{seq, record}` line per item in order
pub fn encode_events<T: Serialize>(items: &[T]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for (seq, record) in items.iter().enumerate() {
        serde_json::to_writer(&mut encoder, &EventLine { seq: seq as u64, record })
            .context("Failed to serialize event line")?;
        encoder.write_all(b"\n")?;
    }
    encoder.finish().context("Failed to finish events gzip stream")
}

/// Gzip CSV with `columns` as the header row
fn encode_table<T: Serialize>(rows: &[T], columns: &[&str]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(encoder);
    writer.write_record(columns)?;
    for row in rows {
        writer.serialize(row).context("Failed to serialize CSV row")?;
    }
    let encoder = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e))?;
    encoder.finish().context("Failed to finish gzip stream")
}

pub fn encode_records(records: &[EmailRecord]) -> Result<Vec<u8>> {
    encode_table(records, &RECORD_COLUMNS)
}

pub fn encode_attachments(attachments: &[AttachmentRecord]) -> Result<Vec<u8>> {
    encode_table(attachments, &ATTACHMENT_COLUMNS)
}

/// Decode a tabular export named `name`.
///
/// A stream that fails to decompress or parse is treated as a truncated copy
/// (retryable); an unexpected header means a different export layout (fatal).
fn decode_table<T: DeserializeOwned>(data: &[u8], columns: &[&str], name: &str) -> Result<Vec<T>, StageError> {
    let mut csv_bytes = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut csv_bytes)
        .map_err(|e| StageError::validation(format!("{name} is truncated: {e}"), true))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_bytes.as_slice());

    let headers = reader
        .headers()
        .map_err(|e| StageError::validation(format!("{name} has no header: {e}"), true))?;
    if headers.iter().ne(columns.iter().copied()) {
        return Err(StageError::Structural(format!(
            "{name} header does not match the supported layout: {:?}",
            headers.iter().collect::<Vec<_>>()
        )));
    }

    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(row, result)| {
            result.map_err(|e| StageError::validation(format!("{name} row {} unreadable: {e}", row + 1), true))
        })
        .collect()
}

pub fn decode_records(data: &[u8]) -> Result<Vec<EmailRecord>, StageError> {
    decode_table(data, &RECORD_COLUMNS, "records export")
}

pub fn decode_attachments(data: &[u8]) -> Result<Vec<AttachmentRecord>, StageError> {
    decode_table(data, &ATTACHMENT_COLUMNS, "attachments export")
}

pub fn encode_manifest(manifest: &Manifest) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(manifest).context("Failed to serialize manifest")
}

pub fn decode_manifest(data: &[u8]) -> Result<Manifest, StageError> {
    serde_json::from_slice(data)
        .map_err(|e| StageError::Structural(format!("manifest is not readable: {e}")))
}
