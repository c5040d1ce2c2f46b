//! Casefile CLI Library
//!
//! Command-line client for the casefile ingestion pipeline server.
//!
//! # Overview
//!
//! - **Submission**: hash a local archive and enqueue it (`casefile enqueue`)
//! - **Job Tracking**: inspect status, list jobs, and show stage history
//!   (`casefile status`, `casefile jobs`, `casefile history`)
//! - **Dead Letters**: list, inspect and replay failed jobs (`casefile dead-letters`)
//! - **Utilities**: content hash and job id of a local file (`casefile hash`),
//!   server health (`casefile health`)

pub mod api;
pub mod commands;
pub mod error;
pub mod output;

// Re-export commonly used types
pub use error::{CliError, Result};

use casefile_common::types::JobStatus;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

/// Casefile - mailbox archive ingestion pipeline client
#[derive(Parser, Debug)]
#[command(name = "casefile")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Server URL
    #[arg(
        long,
        env = "CASEFILE_SERVER_URL",
        default_value = api::client::DEFAULT_SERVER_URL,
        global = true
    )]
    pub server_url: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit an archive for ingestion
    #[command(group(ArgGroup::new("digest").required(true).args(["hash", "file"])))]
    Enqueue {
        /// Archive location as the server's object store sees it (e.g. s3://bucket/inbox.mbox)
        location: String,

        /// SHA-256 of the archive, hex encoded
        #[arg(long)]
        hash: Option<String>,

        /// Local copy of the archive to hash
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show the status of one job
    Status {
        job_id: Uuid,
    },

    /// List recent jobs
    Jobs {
        /// Only jobs in this status (queued, running, retry_pending, completed, failed, dead_lettered)
        #[arg(short, long, value_parser = parse_status)]
        status: Option<JobStatus>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show every stage attempt of a job
    History {
        job_id: Uuid,
    },

    /// Inspect and replay dead-lettered jobs
    DeadLetters {
        #[command(subcommand)]
        command: DeadLetterCommand,
    },

    /// Print the content hash and job id of a local archive
    Hash {
        path: PathBuf,
    },

    /// Check server health
    Health,
}

/// Dead-letter subcommands
#[derive(Subcommand, Debug)]
pub enum DeadLetterCommand {
    /// List dead-lettered jobs
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one dead-letter entry
    Show {
        job_id: Uuid,
    },

    /// Re-enqueue a dead-lettered job from the first stage
    Replay {
        job_id: Uuid,
    },
}

fn parse_status(value: &str) -> std::result::Result<JobStatus, String> {
    value.parse().map_err(|e: casefile_common::CasefileError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_enqueue_requires_a_digest() {
        let err = Cli::try_parse_from(["casefile", "enqueue", "s3://b/a.mbox"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let err = Cli::try_parse_from([
            "casefile",
            "enqueue",
            "s3://b/a.mbox",
            "--hash",
            "ab",
            "--file",
            "a.mbox",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_jobs_status_filter() {
        let cli = Cli::try_parse_from(["casefile", "jobs", "--status", "retry_pending", "-o", "json"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Jobs { status, limit } => {
                assert_eq!(status, Some(JobStatus::RetryPending));
                assert_eq!(limit, None);
            },
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["casefile", "jobs", "--status", "stuck"]).is_err());
    }

    #[test]
    fn test_dead_letter_replay_parses_uuid() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["casefile", "dead-letters", "replay", &id.to_string()]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::DeadLetters {
                command: DeadLetterCommand::Replay { job_id }
            } if job_id == id
        ));
    }
}
