use crate::api::ApiClient;
use crate::utils::error::{CliError, CliResult};
use colored::*;

/// Execute the delete command. A key wins over a group.
pub async fn execute(
    client: &ApiClient,
    gid: Option<String>,
    key: Option<String>,
    verbose: bool,
) -> CliResult<()> {
    match (key, gid) {
        (Some(key), _) => {
            client.delete_report(&key).await?;
            println!("{} {}", "Deleted".green().bold(), key);
        }
        (None, Some(gid)) => {
            let deleted = client.delete_group(&gid).await?;
            println!(
                "{} {} report(s) from {}",
                "Deleted".green().bold(),
                deleted.len(),
                gid.bold()
            );
            if verbose {
                for key in deleted {
                    println!("  {}", key.dimmed());
                }
            }
        }
        (None, None) => {
            return Err(CliError::InvalidArgument(
                "Pass --gid or --key".to_string(),
            ))
        }
    }
    Ok(())
}
