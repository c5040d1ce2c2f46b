//! `casefile enqueue` command implementation

use crate::api::{ApiClient, SourceRef};
use crate::error::{CliError, Result};
use crate::output;
use crate::OutputFormat;
use casefile_common::checksum::{file_sha256, is_sha256_hex};
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Content hash from `--hash`, or computed from `--file`
pub fn resolve_hash(hash: Option<&str>, file: Option<&Path>) -> Result<String> {
    match (hash, file) {
        (Some(hash), _) => {
            if !is_sha256_hex(hash) {
                return Err(CliError::invalid_argument(format!(
                    "'{hash}' is not a SHA-256 hex digest (64 hex characters)"
                )));
            }
            Ok(hash.to_ascii_lowercase())
        },
        (None, Some(path)) => {
            if !path.is_file() {
                return Err(CliError::FileNotFound(path.display().to_string()));
            }
            Ok(file_sha256(path)?)
        },
        (None, None) => Err(CliError::invalid_argument("either --hash or --file is required")),
    }
}

pub async fn run(
    client: &ApiClient,
    location: String,
    hash: Option<String>,
    file: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let content_hash = resolve_hash(hash.as_deref(), file.as_deref())?;
    tracing::debug!(%location, %content_hash, "Enqueueing archive");

    let response = client.enqueue(SourceRef::new(location, content_hash)).await?;

    if format == OutputFormat::Json {
        return output::print_json(&response);
    }

    if response.created {
        println!("{} {}", "Enqueued job".green(), response.job_id);
    } else {
        println!(
            "{} {}",
            "Archive already known, existing job".yellow(),
            response.job_id
        );
    }
    println!("Track it with: casefile status {}", response.job_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_common::checksum::sha256_hex;
    use std::io::Write;

    #[test]
    fn test_resolve_hash_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"From a@b Mon Jan  1 00:00:00 2024\n\nhi\n").unwrap();

        let hash = resolve_hash(None, Some(file.path())).unwrap();
        assert_eq!(hash, sha256_hex(b"From a@b Mon Jan  1 00:00:00 2024\n\nhi\n"));
    }

    #[test]
    fn test_resolve_hash_normalizes_case() {
        let upper = "AB".repeat(32);
        assert_eq!(resolve_hash(Some(&upper), None).unwrap(), "ab".repeat(32));
    }

    #[test]
    fn test_resolve_hash_rejects_garbage() {
        assert!(matches!(
            resolve_hash(Some("abc"), None),
            Err(CliError::InvalidArgument(_))
        ));
        assert!(matches!(
            resolve_hash(None, Some(Path::new("/definitely/not/here.mbox"))),
            Err(CliError::FileNotFound(_))
        ));
    }
}
