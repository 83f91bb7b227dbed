use crate::utils::error::{CliError, CliResult};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Client settings, resolved from flags and environment by clap
#[derive(Debug, Clone)]
pub struct Config {
    /// Report server base URL
    pub server_url: String,
    /// Signed token sent as bearer credential
    pub jwt: Option<String>,
    /// Timeout for API requests in seconds
    pub timeout: u64,
    pub retry: RetrySettings,
}

/// Retry behavior for idempotent requests
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            jwt: None,
            timeout: 30,
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    pub fn new(server_url: impl Into<String>, jwt: Option<String>) -> CliResult<Self> {
        let server_url = server_url.into();
        validate_server_url(&server_url)?;
        Ok(Self {
            server_url,
            jwt: jwt.filter(|token| !token.trim().is_empty()),
            ..Self::default()
        })
    }
}

fn validate_server_url(url: &str) -> CliResult<()> {
    if url.trim().is_empty() {
        return Err(CliError::Config("Server URL cannot be empty".to_string()));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(CliError::Config(
            "Server URL must start with http:// or https://".to_string(),
        ));
    }
    Ok(())
}
