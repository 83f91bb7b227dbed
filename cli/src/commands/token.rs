use crate::api::{ApiClient, TokenRequest};
use crate::utils::error::{CliError, CliResult};

/// Build the exchange body from command line credentials
pub fn request_from(
    user: Option<String>,
    oauth: Option<String>,
    certificate: Option<String>,
) -> CliResult<TokenRequest> {
    match (user, oauth, certificate) {
        (None, None, Some(certificate)) => Ok(TokenRequest {
            certificate,
            ..Default::default()
        }),
        (Some(user), Some(github_token), None) => Ok(TokenRequest {
            user,
            github_token,
            ..Default::default()
        }),
        (_, _, Some(_)) => Err(CliError::InvalidArgument(
            "Use either --certificate or --user and --oauth, not both".to_string(),
        )),
        _ => Err(CliError::InvalidArgument(
            "A token needs --certificate, or both --user and --oauth".to_string(),
        )),
    }
}

/// Execute the token command: print a freshly issued token
pub async fn execute(
    client: &ApiClient,
    user: Option<String>,
    oauth: Option<String>,
    certificate: Option<String>,
    verbose: bool,
) -> CliResult<()> {
    let request = request_from(user, oauth, certificate)?;
    if verbose {
        let kind = if request.certificate.is_empty() {
            "developer"
        } else {
            "application"
        };
        eprintln!("Requesting {} token...", kind);
    }

    let token = client.exchange_token(&request).await?;
    println!("{}", token);
    Ok(())
}
