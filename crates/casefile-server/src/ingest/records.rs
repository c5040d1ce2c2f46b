//! Record shapes that flow from the extractor through canonical storage

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters of body text copied into canonical rows and index documents
pub const BODY_PREVIEW_CHARS: usize = 10_000;

/// One row of the tabular export, and of the staging area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailRecord {
    pub record_id: Uuid,
    pub archive_hash: String,
    pub source_path: String,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    /// Whitespace-separated Message-IDs from the References header
    pub references_header: Option<String>,
    pub subject: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub recipients_to: Option<String>,
    pub recipients_cc: Option<String>,
    pub recipients_bcc: Option<String>,
    pub sent_at_epoch: Option<i64>,
    pub body_text: Option<String>,
    /// Only set when the message carries a real `text/html` part
    pub body_html: Option<String>,
    /// Hex SHA-256 of the raw message bytes
    pub body_hash: String,
}

impl EmailRecord {
    /// Names of required fields that are empty
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.record_id.is_nil() {
            missing.push("record_id");
        }
        if self.archive_hash.trim().is_empty() {
            missing.push("archive_hash");
        }
        if self.source_path.trim().is_empty() {
            missing.push("source_path");
        }
        if self.body_hash.trim().is_empty() {
            missing.push("body_hash");
        }
        missing
    }

    pub fn body_preview(&self) -> Option<String> {
        self.body_text
            .as_ref()
            .map(|body| body.chars().take(BODY_PREVIEW_CHARS).collect())
    }

    /// `Message-ID`s this record points at, In-Reply-To first
    pub fn parent_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for raw in self.in_reply_to.iter().chain(self.references_header.iter()) {
            for id in raw.split_whitespace() {
                let id = normalize_message_id(id);
                if !id.is_empty() && !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

/// One MIME attachment of a message, without its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttachmentRecord {
    pub attachment_id: Uuid,
    /// Message the attachment belongs to
    pub record_id: Uuid,
    pub archive_hash: String,
    /// Position among the message's attachment parts
    pub part_index: i32,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    /// Hex SHA-256 of the decoded content
    pub content_hash: String,
    pub is_inline: bool,
    pub content_id: Option<String>,
    /// Object-store key holding the content
    pub blob_key: String,
}

impl AttachmentRecord {
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.attachment_id.is_nil() {
            missing.push("attachment_id");
        }
        if self.record_id.is_nil() {
            missing.push("record_id");
        }
        if self.content_hash.trim().is_empty() {
            missing.push("content_hash");
        }
        if self.blob_key.trim().is_empty() {
            missing.push("blob_key");
        }
        missing
    }
}

/// A merged row in canonical storage, with post-processing annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CanonicalRecord {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: EmailRecord,
    pub body_preview: Option<String>,
    pub thread_id: Option<Uuid>,
    pub duplicate_of: Option<Uuid>,
}

impl CanonicalRecord {
    pub fn from_staged(record: EmailRecord) -> Self {
        Self {
            body_preview: record.body_preview(),
            record,
            thread_id: None,
            duplicate_of: None,
        }
    }
}

/// Searchable projection of one non-duplicate record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndexDocument {
    pub record_id: Uuid,
    pub archive_hash: String,
    pub thread_id: Option<Uuid>,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub sent_at_epoch: Option<i64>,
    pub preview: Option<String>,
    pub terms: Vec<String>,
}

/// Lowercased Message-ID without angle brackets
pub fn normalize_message_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use casefile_common::checksum::{sha256_hex, stable_uuid};

    pub fn record(archive_hash: &str, n: usize) -> EmailRecord {
        let body = format!("body of message {n}");
        EmailRecord {
            record_id: stable_uuid(&format!("{archive_hash}|{n}")),
            archive_hash: archive_hash.to_string(),
            source_path: format!("message-{n:06}"),
            message_id: Some(format!("<m{n}@example.com>")),
            in_reply_to: None,
            references_header: None,
            subject: Some(format!("Subject {n}")),
            sender_email: Some("alice@example.com".into()),
            sender_name: Some("Alice".into()),
            recipients_to: Some("bob@example.com".into()),
            recipients_cc: None,
            recipients_bcc: None,
            sent_at_epoch: Some(1_700_000_000 + n as i64),
            body_hash: sha256_hex(body.as_bytes()),
            body_text: Some(body),
            body_html: None,
        }
    }

    pub fn attachment(parent: &EmailRecord, part_index: i32) -> AttachmentRecord {
        let content = format!("attachment {part_index} of {}", parent.record_id);
        let content_hash = sha256_hex(content.as_bytes());
        let attachment_id = stable_uuid(&format!("{}|{content_hash}|{part_index}", parent.record_id));
        AttachmentRecord {
            attachment_id,
            record_id: parent.record_id,
            archive_hash: parent.archive_hash.clone(),
            part_index,
            filename: format!("report-{part_index}.pdf"),
            content_type: Some("application/pdf".into()),
            size_bytes: content.len() as i64,
            content_hash,
            is_inline: false,
            content_id: None,
            blob_key: format!("extract/test/attachments/{attachment_id}"),
        }
    }
}
