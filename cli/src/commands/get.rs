use crate::api::{ApiClient, ReportQuery};
use crate::utils::error::{CliError, CliResult};
use colored::*;

/// Pick the query from the flags. A key wins over a group, a group over a
/// severity.
pub fn query_from(
    all: bool,
    gid: Option<String>,
    severity: Option<String>,
    key: Option<String>,
) -> CliResult<ReportQuery> {
    if let Some(key) = key {
        return Ok(ReportQuery::Key(key));
    }
    if let Some(gid) = gid {
        return Ok(ReportQuery::Group(gid));
    }
    if let Some(severity) = severity {
        return Ok(ReportQuery::Severity(severity));
    }
    if all {
        return Ok(ReportQuery::All);
    }
    Err(CliError::InvalidArgument(
        "Pass one of --all, --gid, --severity or --key".to_string(),
    ))
}

/// Execute the get command
pub async fn execute(client: &ApiClient, query: ReportQuery, verbose: bool) -> CliResult<()> {
    if verbose {
        eprintln!("Fetching {:?}...", query);
    }

    let listing = client.get_reports(&query).await?;
    if listing.partial {
        eprintln!(
            "{} some reports could not be read by the server; showing the rest",
            "Warning:".yellow().bold()
        );
    }

    println!("{}", serde_json::to_string_pretty(&listing.reports)?);
    if verbose {
        eprintln!("{} report(s)", listing.reports.len().to_string().cyan());
    }
    Ok(())
}
