//! `casefile dead-letters` subcommands

use crate::api::ApiClient;
use crate::error::{CliError, Result};
use crate::output;
use crate::{DeadLetterCommand, OutputFormat};
use colored::Colorize;
use uuid::Uuid;

pub async fn run(client: &ApiClient, command: &DeadLetterCommand, format: OutputFormat) -> Result<()> {
    match command {
        DeadLetterCommand::List { limit } => list(client, *limit, format).await,
        DeadLetterCommand::Show { job_id } => show(client, *job_id, format).await,
        DeadLetterCommand::Replay { job_id } => replay(client, *job_id, format).await,
    }
}

pub async fn list(client: &ApiClient, limit: Option<usize>, format: OutputFormat) -> Result<()> {
    if limit == Some(0) {
        return Err(CliError::invalid_argument("--limit must be at least 1"));
    }
    let list = client.list_dead_letters(limit).await?;
    output::dead_letters(&list.entries, format)
}

pub async fn show(client: &ApiClient, job_id: Uuid, format: OutputFormat) -> Result<()> {
    let entry = client.get_dead_letter(job_id).await?;
    output::dead_letter(&entry, format)
}

pub async fn replay(client: &ApiClient, job_id: Uuid, format: OutputFormat) -> Result<()> {
    let response = client.replay(job_id).await?;

    if format == OutputFormat::Json {
        return output::print_json(&response);
    }
    println!(
        "{} {} {} {}",
        "Replaying".green(),
        response.replay_of,
        "as job".green(),
        response.job_id
    );
    Ok(())
}
