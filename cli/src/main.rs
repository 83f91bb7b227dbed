use clap::{Parser, Subcommand};
use colored::*;
use report_cli::{
    api::ApiClient,
    commands::{cert, delete, get, healthcheck, token},
    config::{settings::DEFAULT_SERVER_URL, Config},
    CliResult,
};
use std::process;

#[derive(Parser)]
#[command(
    name = "reportctl",
    version = env!("CARGO_PKG_VERSION"),
    about = "Command-line client for the report server",
    long_about = "reportctl obtains tokens, reads and deletes reports, and manages application certificates on a report server."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "REPORT_SERVER_URL", default_value = DEFAULT_SERVER_URL, help = "Report server base URL")]
    url: String,

    #[arg(long, global = true, env = "REPORT_JWT", hide_env_values = true, help = "Token to authenticate with")]
    jwt: Option<String>,

    #[arg(long, global = true, help = "GitHub username, exchanged for a token with --oauth")]
    user: Option<String>,

    #[arg(long, global = true, hide_env_values = true, env = "REPORT_GH_TOKEN", help = "GitHub OAuth token")]
    oauth: Option<String>,

    #[arg(long, global = true, help = "Enable verbose output")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the health status of the server
    Healthcheck,

    /// Exchange credentials for a token and print it
    Token {
        #[arg(long, help = "Application certificate")]
        certificate: Option<String>,
    },

    /// Print reports as JSON
    Get {
        #[arg(long, help = "Every stored report")]
        all: bool,

        #[arg(long, help = "Reports of one group")]
        gid: Option<String>,

        #[arg(long, help = "Reports of one severity (bug, crash, 1, 2)")]
        severity: Option<String>,

        #[arg(long, help = "A single report by key")]
        key: Option<String>,
    },

    /// Delete a report or a whole group
    Delete {
        #[arg(long, help = "Delete every report of this group")]
        gid: Option<String>,

        #[arg(long, help = "Delete the report with this key")]
        key: Option<String>,
    },

    /// Manage application certificates
    Cert {
        #[command(subcommand)]
        action: CertAction,
    },
}

#[derive(Subcommand)]
enum CertAction {
    /// Register a certificate
    Add { cert: String },
    /// Revoke a certificate
    Remove { cert: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = Config::new(cli.url, cli.jwt)?;
    let mut client = ApiClient::new(&config)?;

    if let Commands::Token { certificate } = cli.command {
        return token::execute(&client, cli.user, cli.oauth, certificate, cli.verbose).await;
    }

    // developer credentials stand in for a token on every other command
    if !client.has_token() {
        if let (Some(user), Some(oauth)) = (cli.user, cli.oauth) {
            let request = token::request_from(Some(user), Some(oauth), None)?;
            let jwt = client.exchange_token(&request).await?;
            client.set_token(jwt);
        }
    }

    match cli.command {
        Commands::Healthcheck => healthcheck::execute(&client, cli.verbose).await,
        Commands::Get {
            all,
            gid,
            severity,
            key,
        } => {
            let query = get::query_from(all, gid, severity, key)?;
            get::execute(&client, query, cli.verbose).await
        }
        Commands::Delete { gid, key } => delete::execute(&client, gid, key, cli.verbose).await,
        Commands::Cert { action } => match action {
            CertAction::Add { cert } => cert::add(&client, &cert).await,
            CertAction::Remove { cert } => cert::remove(&client, &cert).await,
        },
        Commands::Token { .. } => Ok(()),
    }
}
