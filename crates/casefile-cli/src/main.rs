//! Casefile CLI - Main entry point

use casefile_cli::api::ApiClient;
use casefile_cli::commands;
use casefile_cli::{Cli, Commands};
use casefile_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use clap::Parser;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Log to stderr so table and JSON output on stdout stay clean
    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .console_stderr(true)
        .log_file_prefix("casefile-cli")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // CLI should work without logging
    let _guard = init_logging(&log_config).ok().flatten();

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

async fn execute_command(cli: &Cli) -> casefile_cli::Result<()> {
    let format = cli.output;

    let client = || ApiClient::new(cli.server_url.clone());

    match &cli.command {
        Commands::Hash { path } => commands::hash::run(path, format),

        Commands::Enqueue {
            location,
            hash,
            file,
        } => {
            commands::enqueue::run(&client()?, location.clone(), hash.clone(), file.clone(), format)
                .await
        },

        Commands::Status { job_id } => commands::jobs::status(&client()?, *job_id, format).await,

        Commands::Jobs { status, limit } => {
            commands::jobs::list(&client()?, *status, *limit, format).await
        },

        Commands::History { job_id } => commands::jobs::history(&client()?, *job_id, format).await,

        Commands::DeadLetters { command } => {
            commands::dead_letters::run(&client()?, command, format).await
        },

        Commands::Health => commands::health::run(&client()?, format).await,
    }
}
