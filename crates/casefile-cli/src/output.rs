//! Terminal rendering for server responses

use crate::error::Result;
use crate::OutputFormat;
use casefile_common::types::{
    DeadLetterView, JobStatus, JobStatusView, OutcomeKind, StageExecutionView,
};
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn status_label(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Completed => status.as_str().green(),
        JobStatus::DeadLettered | JobStatus::Failed => status.as_str().red(),
        JobStatus::RetryPending => status.as_str().yellow(),
        JobStatus::Running => status.as_str().cyan(),
        JobStatus::Queued => status.as_str().normal(),
    }
}

pub fn outcome_label(outcome: OutcomeKind) -> ColoredString {
    match outcome {
        OutcomeKind::Success => outcome.as_str().green(),
        OutcomeKind::RetryableFailure => outcome.as_str().yellow(),
        OutcomeKind::FatalFailure => outcome.as_str().red(),
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Cut `text` to `max` characters, marking the cut
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

fn table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table
}

pub fn job(job: &JobStatusView, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(job);
    }

    let mut table = table();
    table.add_row(vec!["Job", &job.job_id.to_string()]);
    table.add_row(vec!["Location", &job.source_ref.location]);
    table.add_row(vec!["Content hash", &job.source_ref.content_hash]);
    table.add_row(vec!["Status", &status_label(job.status).to_string()]);
    let stage = if job.status.is_terminal() {
        job.current_stage.as_str()
    } else {
        job.current_stage.activity()
    };
    table.add_row(vec!["Stage", stage]);
    table.add_row(vec!["Failed attempts", &job.attempt_count.to_string()]);
    if let Some(replay_of) = job.replay_of {
        table.add_row(vec!["Replay of", &replay_of.to_string()]);
    }
    if let Some(ref error) = job.last_error {
        table.add_row(vec!["Last error", error]);
    }
    table.add_row(vec!["Enqueued", &timestamp(&job.enqueued_at)]);
    table.add_row(vec!["Updated", &timestamp(&job.updated_at)]);

    println!("{table}");
    Ok(())
}

pub fn jobs(jobs: &[JobStatusView], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(jobs);
    }
    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    let mut table = table();
    table.set_header(vec!["Job", "Location", "Stage", "Status", "Attempts", "Updated"]);
    for job in jobs {
        table.add_row(vec![
            job.job_id.to_string(),
            truncate(&job.source_ref.location, 48),
            job.current_stage.to_string(),
            status_label(job.status).to_string(),
            job.attempt_count.to_string(),
            timestamp(&job.updated_at),
        ]);
    }

    println!("{table}");
    println!("{} job(s)", jobs.len());
    Ok(())
}

pub fn executions(history: &[StageExecutionView], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(history);
    }
    if history.is_empty() {
        println!("No stage has run yet.");
        return Ok(());
    }

    let mut table = table();
    table.set_header(vec!["Stage", "Attempt", "Outcome", "Duration", "Output / Error"]);
    for execution in history {
        let millis = (execution.ended_at - execution.started_at).num_milliseconds();
        let detail = execution
            .output_ref
            .as_deref()
            .or(execution.error_detail.as_deref())
            .unwrap_or("");
        table.add_row(vec![
            execution.stage_name.to_string(),
            execution.attempt_no.to_string(),
            outcome_label(execution.outcome).to_string(),
            format!("{millis} ms"),
            truncate(detail, 60),
        ]);
    }

    println!("{table}");
    Ok(())
}

pub fn dead_letter(entry: &DeadLetterView, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(entry);
    }

    let mut table = table();
    table.add_row(vec!["Job", &entry.job_id.to_string()]);
    table.add_row(vec!["Stage", entry.stage_name.as_str()]);
    table.add_row(vec!["Attempts", &entry.total_attempts.to_string()]);
    table.add_row(vec!["Error", &entry.last_error]);
    table.add_row(vec!["Dead-lettered", &timestamp(&entry.created_at)]);

    println!("{table}");
    Ok(())
}

pub fn dead_letters(entries: &[DeadLetterView], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(entries);
    }
    if entries.is_empty() {
        println!("{}", "Dead-letter sink is empty.".green());
        return Ok(());
    }

    let mut table = table();
    table.set_header(vec!["Job", "Stage", "Attempts", "Error", "When"]);
    for entry in entries {
        table.add_row(vec![
            entry.job_id.to_string(),
            entry.stage_name.to_string(),
            entry.total_attempts.to_string(),
            truncate(&entry.last_error, 60),
            timestamp(&entry.created_at),
        ]);
    }

    println!("{table}");
    println!("{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    Ok(())
}
