//! `casefile health` command implementation

use crate::api::ApiClient;
use crate::error::{CliError, Result};
use crate::output;
use crate::OutputFormat;
use colored::Colorize;

pub async fn run(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    if format == OutputFormat::Json {
        output::print_json(&health)?;
    } else {
        let status = if health.status == "healthy" {
            health.status.green()
        } else {
            health.status.red()
        };
        println!("Server:  {} ({})", client.base_url(), status);
        println!("Backend: {}", health.backend);
        if let Some(queue) = health.queue {
            println!(
                "Queue:   {} ready, {} delayed, {} leased",
                queue.ready, queue.delayed, queue.leased
            );
        }
    }

    if health.status == "healthy" {
        Ok(())
    } else {
        Err(CliError::api(503, format!("server reports {}", health.status)))
    }
}
