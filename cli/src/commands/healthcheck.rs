use crate::api::ApiClient;
use crate::utils::error::CliResult;
use colored::*;

/// Execute the healthcheck command
pub async fn execute(client: &ApiClient, verbose: bool) -> CliResult<()> {
    if verbose {
        println!("Checking server health...");
    }

    let response = client.health_check().await?;

    let status_display = match response.status.as_str() {
        "healthy" => response.status.green().bold(),
        _ => response.status.yellow().bold(),
    };
    println!("{} {}", "Status:".bold(), status_display);
    println!("{} {}", "Version:".bold(), response.version);
    if verbose {
        println!("{} {}", "Timestamp:".bold(), response.timestamp.dimmed());
    }

    if response.status != "healthy" {
        std::process::exit(1);
    }
    Ok(())
}
