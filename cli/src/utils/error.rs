use std::fmt;

/// Result type alias for reportctl operations
pub type CliResult<T> = Result<T, CliError>;

/// Main error type for reportctl
#[derive(Debug)]
pub enum CliError {
    /// IO-related errors
    Io(std::io::Error),
    /// HTTP request errors
    Http(reqwest::Error),
    /// JSON serialization/deserialization errors
    Json(serde_json::Error),
    /// Configuration errors
    Config(String),
    /// Authentication errors
    Auth(String),
    /// Server errors with status code and the envelope description
    Api { status: u16, message: String },
    /// Invalid command line arguments
    InvalidArgument(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::Http(e) => write!(f, "HTTP error: {}", e),
            CliError::Json(e) => write!(f, "JSON error: {}", e),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            CliError::Api { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(e) => Some(e),
            CliError::Http(e) => Some(e),
            CliError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<reqwest::Error> for CliError {
    fn from(err: reqwest::Error) -> Self {
        CliError::Http(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Json(err)
    }
}
