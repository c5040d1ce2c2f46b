//! `casefile hash` command implementation
//!
//! Prints the content hash of a local archive and the job id the server will
//! assign to it, without contacting the server.

use crate::error::{CliError, Result};
use crate::output;
use crate::OutputFormat;
use casefile_common::checksum::{file_sha256, job_id_for};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ArchiveDigest {
    pub path: String,
    pub content_hash: String,
    pub job_id: Uuid,
}

pub fn digest(path: &Path) -> Result<ArchiveDigest> {
    if !path.is_file() {
        return Err(CliError::FileNotFound(path.display().to_string()));
    }
    let content_hash = file_sha256(path)?;
    Ok(ArchiveDigest {
        path: path.display().to_string(),
        job_id: job_id_for(&content_hash),
        content_hash,
    })
}

pub fn run(path: &Path, format: OutputFormat) -> Result<()> {
    let digest = digest(path)?;
    match format {
        OutputFormat::Json => output::print_json(&digest),
        OutputFormat::Table => {
            println!("{}  {}", digest.content_hash, digest.path);
            println!("job id: {}", digest.job_id);
            Ok(())
        },
    }
}
