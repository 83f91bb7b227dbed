use crate::api::ApiClient;
use crate::utils::error::CliResult;
use colored::*;

pub async fn add(client: &ApiClient, cert: &str) -> CliResult<()> {
    client.add_certificate(cert).await?;
    println!("{} certificate", "Registered".green().bold());
    Ok(())
}

pub async fn remove(client: &ApiClient, cert: &str) -> CliResult<()> {
    client.remove_certificate(cert).await?;
    println!("{} certificate", "Revoked".green().bold());
    Ok(())
}
