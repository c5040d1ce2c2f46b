//! Content hashes and content-derived identities
//!
//! Every identity in the pipeline (jobs, records, threads) is derived from
//! content rather than position or time, so the same input always maps to
//! the same identifier on every worker.

use crate::error::{CasefileError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

/// Hex-encoded SHA-256 of an in-memory buffer
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex-encoded SHA-256 of any readable source
pub fn compute_sha256<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encoded SHA-256 of a file on disk
pub fn file_sha256(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_sha256(&mut file)
}

/// Verify a buffer against an expected hex SHA-256
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(CasefileError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Whether `value` is a lowercase or uppercase 64-character hex digest
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Derive a UUID from a seed string.
///
/// Takes the first 16 bytes of SHA-256(seed) and stamps the version (5) and
/// RFC 4122 variant bits, so the result parses as a regular UUID everywhere
/// while staying a pure function of the seed.
pub fn stable_uuid(seed: &str) -> Uuid {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0F) | 0x50;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Uuid::from_bytes(bytes)
}

/// Job identity for a source archive: a pure function of its content hash
pub fn job_id_for(content_hash: &str) -> Uuid {
    stable_uuid(&format!("job|{}", content_hash.to_ascii_lowercase()))
}

/// Job identity for an operator replay of a dead-lettered job
pub fn replay_job_id_for(content_hash: &str, replay_of: Uuid) -> Uuid {
    stable_uuid(&format!(
        "job|{}|replay|{}",
        content_hash.to_ascii_lowercase(),
        replay_of
    ))
}
