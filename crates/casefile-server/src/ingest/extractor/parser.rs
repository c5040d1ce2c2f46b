//! Archive parsers
//!
//! Turn the bytes of one source archive into ordered [`ParsedMessage`]s. Parsing
//! is CPU-bound and synchronous; the extract stage runs it on the blocking pool.

use casefile_common::checksum::{sha256_hex, stable_uuid};
use mail_parser::{Address, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::ingest::framework::StageError;
use crate::ingest::records::{AttachmentRecord, EmailRecord};

/// Parser for one archive format
pub trait ArchiveParser: Send + Sync {
    /// Short format name, used in logs
    fn format(&self) -> &str;

    /// Parse every message of `data`
    ///
    /// # Arguments
    /// * `archive_hash` - Content hash of the archive, stamped on every record
    /// * `data` - Raw archive bytes
    ///
    /// # Returns
    /// Messages in archive order. An archive with nothing parseable is
    /// `CorruptInput`.
    fn parse(&self, archive_hash: &str, data: &[u8]) -> Result<Vec<ParsedMessage>, StageError>;
}

/// A message row plus the attachment parts found in it
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub record: EmailRecord,
    pub attachments: Vec<AttachmentPart>,
}

/// Decoded attachment content and the MIME metadata that describes it
#[derive(Debug, Clone)]
pub struct AttachmentPart {
    pub part_index: i32,
    pub filename: String,
    pub content_type: Option<String>,
    pub is_inline: bool,
    pub content_id: Option<String>,
    pub content: Vec<u8>,
}

impl AttachmentPart {
    /// Metadata row for this part of `parent`, with content stored at `blob_key(attachment_id)`
    pub fn to_record(
        &self,
        parent: &EmailRecord,
        blob_key: impl FnOnce(uuid::Uuid) -> String,
    ) -> AttachmentRecord {
        let content_hash = sha256_hex(&self.content);
        let attachment_id = stable_uuid(&format!(
            "{}|{}|{}|{}",
            parent.record_id, content_hash, self.filename, self.part_index
        ));
        AttachmentRecord {
            attachment_id,
            record_id: parent.record_id,
            archive_hash: parent.archive_hash.clone(),
            part_index: self.part_index,
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.content.len() as i64,
            content_hash,
            is_inline: self.is_inline,
            content_id: self.content_id.clone(),
            blob_key: blob_key(attachment_id),
        }
    }
}

/// mbox archives, or a single bare RFC 822 message
#[derive(Debug, Default, Clone, Copy)]
pub struct MboxArchiveParser;

impl MboxArchiveParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_message(&self, archive_hash: &str, index: usize, raw: &[u8]) -> Option<ParsedMessage> {
        let message = MessageParser::default().parse(raw)?;

        let message_id = message.message_id().map(|id| format!("<{}>", id.trim()));
        let subject = message.subject().map(str::to_string);
        let sent_at_epoch = message.date().map(|d| d.to_timestamp());
        let sender = message.from().and_then(|addr| addr.first());
        let sender_email = sender.and_then(|a| a.address()).map(str::to_string);
        let sender_name = sender.and_then(|a| a.name()).map(str::to_string);

        // Fragments between envelope lines that carry none of these are not mail
        if message_id.is_none() && subject.is_none() && sent_at_epoch.is_none() && sender_email.is_none() {
            return None;
        }

        let body_text = message
            .body_text(0)
            .map(|text| text.to_string())
            .or_else(|| message.body_html(0).map(|html| html.to_string()));
        // body_html(0) renders plain text as HTML; keep only genuine HTML parts
        let body_html = message.html_part(0).and_then(|part| match &part.body {
            PartType::Html(html) => Some(html.to_string()),
            _ => None,
        });

        let headers = header_block(raw);
        let source_path = format!("message-{index:06}");
        let body_hash = sha256_hex(raw);

        let record = EmailRecord {
            record_id: stable_uuid(&format!("{archive_hash}|{source_path}|{body_hash}")),
            archive_hash: archive_hash.to_string(),
            source_path,
            message_id,
            in_reply_to: raw_header(&headers, "In-Reply-To"),
            references_header: raw_header(&headers, "References"),
            subject,
            sender_email,
            sender_name,
            recipients_to: join_addresses(message.to()),
            recipients_cc: join_addresses(message.cc()),
            recipients_bcc: join_addresses(message.bcc()),
            sent_at_epoch,
            body_text,
            body_html,
            body_hash,
        };

        let attachments = message
            .attachments()
            .enumerate()
            .filter_map(|(index, part)| attachment_part(index, part))
            .collect();

        Some(ParsedMessage { record, attachments })
    }
}

impl ArchiveParser for MboxArchiveParser {
    fn format(&self) -> &str {
        "mbox"
    }

    fn parse(&self, archive_hash: &str, data: &[u8]) -> Result<Vec<ParsedMessage>, StageError> {
        let messages = if looks_like_mbox(data) {
            split_mbox(data)
        } else if looks_like_message(data) {
            vec![data]
        } else {
            return Err(StageError::CorruptInput(
                "archive is neither an mbox file nor an RFC 822 message".to_string(),
            ));
        };

        let parsed: Vec<ParsedMessage> = messages
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| self.parse_message(archive_hash, index, raw))
            .collect();

        if parsed.is_empty() {
            return Err(StageError::CorruptInput(
                "archive contains no parseable messages".to_string(),
            ));
        }
        Ok(parsed)
    }
}

pub fn looks_like_mbox(data: &[u8]) -> bool {
    data.starts_with(b"From ") || data.windows(6).any(|w| w == b"\nFrom ")
}

fn looks_like_message(data: &[u8]) -> bool {
    const LEADING_HEADERS: [&[u8]; 6] = [
        b"From:",
        b"Return-Path:",
        b"Received:",
        b"Date:",
        b"Subject:",
        b"Message-ID:",
    ];
    LEADING_HEADERS.iter().any(|h| data.starts_with(h))
}

/// Split an mbox file into message bodies, dropping each `From ` envelope line
pub fn split_mbox(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    if data.starts_with(b"From ") {
        starts.push(0);
    }
    for i in 0..data.len().saturating_sub(5) {
        if data[i] == b'\n' && data[i + 1..].starts_with(b"From ") {
            starts.push(i + 1);
        }
    }

    let mut messages = Vec::with_capacity(starts.len());
    for (idx, start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(data.len());
        let segment = &data[*start..end];
        if let Some(pos) = segment.iter().position(|b| *b == b'\n') {
            let message = &segment[pos + 1..];
            if !message.iter().all(u8::is_ascii_whitespace) {
                messages.push(message);
            }
        }
    }
    messages
}

/// Header section of a raw message, with folded lines unfolded
fn header_block(raw: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(raw);
    let mut headers: Vec<String> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with(|c: char| c == ' ' || c == '\t') {
            if let Some(last) = headers.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
            }
            continue;
        }
        headers.push(line.to_string());
    }
    headers
}

fn raw_header(headers: &[String], name: &str) -> Option<String> {
    headers.iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case(name) && !value.is_empty()).then(|| value.to_string())
    })
}

/// Leaf parts with no content are skipped, as there is nothing to store
fn attachment_part(index: usize, part: &MessagePart<'_>) -> Option<AttachmentPart> {
    let content = part.contents();
    if content.is_empty() {
        return None;
    }

    let filename = part
        .attachment_name()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(sanitize_filename)
        .unwrap_or_else(|| format!("attachment-{index:03}.bin"));
    let content_type = part.content_type().map(|ct| match ct.subtype() {
        Some(subtype) => format!("{}/{}", ct.ctype(), subtype).to_ascii_lowercase(),
        None => ct.ctype().to_ascii_lowercase(),
    });
    let content_id = part
        .content_id()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    let is_inline = content_id.is_some()
        || part
            .content_disposition()
            .is_some_and(|d| d.ctype().eq_ignore_ascii_case("inline"));

    Some(AttachmentPart {
        part_index: index as i32,
        filename,
        content_type,
        is_inline,
        content_id,
        content: content.to_vec(),
    })
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

fn join_addresses(addr: Option<&Address>) -> Option<String> {
    let addresses: Vec<String> = match addr? {
        Address::List(list) => list
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    };
    (!addresses.is_empty()).then(|| addresses.join(", "))
}
