use anyhow::Context;
use clap::Parser;
use report_server::{
    auth::{FileCertificateRegistry, TokenService},
    create_app,
    github::GitHubService,
    store::{Backend, FsBackend, MemoryBackend, ReportStore},
    utils::config::StorageBackend,
    AppState, Config,
};
use std::{fs::OpenOptions, path::PathBuf, sync::Arc, sync::Mutex};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Parser)]
#[command(name = "report-server", version, about = "Bug and crash report collection server")]
struct Args {
    /// JSON config file keyed by parameter name. Without it, parameters are
    /// read from the environment and `.env`.
    #[arg(long, env = "BRS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    init_tracing(&config.server.log_file)?;

    let config = Arc::new(config);
    info!("Starting report server with config: {:?}", config);

    let backend: Arc<dyn Backend> = match config.storage.backend {
        StorageBackend::Fs => Arc::new(
            FsBackend::open(config.storage.root.clone())
                .await
                .with_context(|| {
                    format!("failed to open storage at {}", config.storage.root.display())
                })?,
        ),
        StorageBackend::Memory => Arc::new(MemoryBackend::new()),
    };
    info!("Using {:?} report storage", config.storage.backend);

    let github = Arc::new(GitHubService::from_config(
        &config.github,
        config.request_timeout,
    )?);
    let certificates = Arc::new(FileCertificateRegistry::new(
        config.storage.certs_file.clone(),
    ));
    let tokens = Arc::new(
        TokenService::new(
            config.jwt.secret.expose().as_bytes(),
            certificates,
            github.clone(),
        )
        .with_timeout(config.request_timeout)
        .with_certificate_recheck(config.jwt.cert_recheck),
    );

    let app = create_app(AppState {
        store: ReportStore::new(backend),
        tokens,
        issues: github,
        config: config.clone(),
    });

    // Run the server with graceful shutdown
    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Log to stderr, stdout or append to a file, per `BRS_LOGFILE`
fn init_tracing(target: &str) -> anyhow::Result<()> {
    let writer = match target {
        "" | "stderr" => BoxMakeWriter::new(std::io::stderr),
        "stdout" => BoxMakeWriter::new(std::io::stdout),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "report_server=debug,tower_http=debug".into()),
        )
        .with_writer(writer)
        .with_ansi(matches!(target, "" | "stderr" | "stdout"))
        .init();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
