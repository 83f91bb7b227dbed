use crate::models::Severity;
use anyhow::{anyhow, Context};
use std::{collections::HashMap, env, fmt, path::{Path, PathBuf}, time::Duration};

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Report and certificate storage
    pub storage: StorageConfig,
    /// Token signing configuration
    pub jwt: JwtConfig,
    /// GitHub App and target repository
    pub github: GitHubConfig,
    /// Minimum severity that files an issue on report creation
    pub issue_threshold: Severity,
    /// Upper bound for every outbound call made while serving a request
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_file: String,
    pub cors_origins: Vec<String>,
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    Fs,
    Memory,
}

#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub root: PathBuf,
    pub certs_file: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct JwtConfig {
    pub secret: Secret,
    /// Re-check application certificates against the registry on every request
    pub cert_recheck: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub app_id: u64,
    pub install_id: u64,
    /// Path to the PEM encoded RSA key of the GitHub App
    pub app_key_path: Secret,
    /// Pre-issued installation token, used instead of the App key when set
    pub installation_token: Secret,
}

/// A configuration value that must never be logged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("[redacted]")
        }
    }
}

/// Where configuration parameters are looked up.
pub trait ParamSource {
    /// Returns the raw value of `name`. `secret` tells the source the value
    /// is sensitive, for stores that keep secrets encrypted.
    fn get(&self, name: &str, secret: bool) -> Option<String>;
}

/// Process environment, after loading a `.env` file if one exists.
pub struct EnvSource;

impl EnvSource {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self
    }
}

impl ParamSource for EnvSource {
    fn get(&self, name: &str, _secret: bool) -> Option<String> {
        env::var(name).ok()
    }
}

/// Flat JSON object keyed by parameter name, e.g. `{"BRS_PORT": 8080}`.
pub struct JsonFileSource {
    values: HashMap<String, String>,
}

impl JsonFileSource {
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)
            .with_context(|| format!("config file {} is not a JSON object", path.display()))?;

        let values = object
            .into_iter()
            .filter_map(|(name, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => return None,
                    other => other.to_string(),
                };
                Some((name, value))
            })
            .collect();

        Ok(Self { values })
    }
}

impl ParamSource for JsonFileSource {
    fn get(&self, name: &str, _secret: bool) -> Option<String> {
        self.values.get(name).cloned()
    }
}

impl ParamSource for HashMap<String, String> {
    fn get(&self, name: &str, _secret: bool) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// One configuration parameter: where it comes from and which field it fills.
pub struct Param {
    pub name: &'static str,
    /// `None` marks the parameter as required
    pub default: Option<&'static str>,
    pub secret: bool,
    apply: fn(&mut Config, &str) -> anyhow::Result<()>,
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid value for {}", name))
}

fn parse_bool(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("invalid value for {}", name)),
    }
}

pub const PARAMS: &[Param] = &[
    Param {
        name: "BRS_HOST",
        default: Some("0.0.0.0"),
        secret: false,
        apply: |c, v| {
            c.server.host = v.to_string();
            Ok(())
        },
    },
    Param {
        name: "BRS_PORT",
        default: Some("8080"),
        secret: false,
        apply: |c, v| {
            c.server.port = parse("BRS_PORT", v)?;
            Ok(())
        },
    },
    Param {
        name: "BRS_LOGFILE",
        default: Some("stderr"),
        secret: false,
        apply: |c, v| {
            c.server.log_file = v.to_string();
            Ok(())
        },
    },
    Param {
        name: "CORS_ORIGINS",
        default: Some("*"),
        secret: false,
        apply: |c, v| {
            c.server.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            Ok(())
        },
    },
    Param {
        name: "MAX_BODY_SIZE",
        default: Some("1048576"),
        secret: false,
        apply: |c, v| {
            c.server.max_body_size = parse("MAX_BODY_SIZE", v)?;
            Ok(())
        },
    },
    Param {
        name: "STORAGE_BACKEND",
        default: Some("fs"),
        secret: false,
        apply: |c, v| {
            c.storage.backend = match v.trim().to_ascii_lowercase().as_str() {
                "fs" | "file" | "disk" => StorageBackend::Fs,
                "memory" | "mem" => StorageBackend::Memory,
                _ => return Err(anyhow!("invalid value for STORAGE_BACKEND")),
            };
            Ok(())
        },
    },
    Param {
        name: "STORAGE_ROOT",
        default: Some("./reports"),
        secret: false,
        apply: |c, v| {
            c.storage.root = PathBuf::from(v);
            Ok(())
        },
    },
    Param {
        name: "MSS_CERTS_LIST",
        default: Some("./certificates.txt"),
        secret: false,
        apply: |c, v| {
            c.storage.certs_file = PathBuf::from(v);
            Ok(())
        },
    },
    Param {
        name: "JWT_SECRET_KEY",
        default: None,
        secret: true,
        apply: |c, v| {
            if v.is_empty() {
                return Err(anyhow!("JWT_SECRET_KEY must not be empty"));
            }
            c.jwt.secret = Secret::new(v);
            Ok(())
        },
    },
    Param {
        name: "CERT_RECHECK",
        default: Some("true"),
        secret: false,
        apply: |c, v| {
            c.jwt.cert_recheck = parse_bool("CERT_RECHECK", v)?;
            Ok(())
        },
    },
    Param {
        name: "REQUEST_TIMEOUT_SECS",
        default: Some("10"),
        secret: false,
        apply: |c, v| {
            c.request_timeout = Duration::from_secs(parse("REQUEST_TIMEOUT_SECS", v)?);
            Ok(())
        },
    },
    Param {
        name: "ISSUE_CREATION_THRESHOLD",
        default: Some("crash"),
        secret: false,
        apply: |c, v| {
            c.issue_threshold = match v.trim().to_ascii_lowercase().as_str() {
                "0" | "unknown" => Severity::Unknown,
                "1" | "bug" => Severity::Bug,
                "2" | "crash" => Severity::Crash,
                _ => return Err(anyhow!("invalid value for ISSUE_CREATION_THRESHOLD")),
            };
            Ok(())
        },
    },
    Param {
        name: "GH_API_URL",
        default: Some("https://api.github.com"),
        secret: false,
        apply: |c, v| {
            c.github.api_url = v.trim_end_matches('/').to_string();
            Ok(())
        },
    },
    Param {
        name: "GH_REPO_OWNER",
        default: None,
        secret: false,
        apply: |c, v| {
            c.github.repo_owner = v.to_string();
            Ok(())
        },
    },
    Param {
        name: "GH_REPO_NAME",
        default: None,
        secret: false,
        apply: |c, v| {
            c.github.repo_name = v.to_string();
            Ok(())
        },
    },
    Param {
        name: "GH_APP_ID",
        default: Some("0"),
        secret: true,
        apply: |c, v| {
            c.github.app_id = parse("GH_APP_ID", v)?;
            Ok(())
        },
    },
    Param {
        name: "GH_INSTALL_ID",
        default: Some("0"),
        secret: true,
        apply: |c, v| {
            c.github.install_id = parse("GH_INSTALL_ID", v)?;
            Ok(())
        },
    },
    Param {
        name: "GH_APP_KEY",
        default: Some(""),
        secret: true,
        apply: |c, v| {
            c.github.app_key_path = Secret::new(v);
            Ok(())
        },
    },
    Param {
        name: "GH_INSTALLATION_TOKEN",
        default: Some(""),
        secret: true,
        apply: |c, v| {
            c.github.installation_token = Secret::new(v);
            Ok(())
        },
    },
];

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(&EnvSource::load())
    }

    /// Load configuration from a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::from_source(&JsonFileSource::from_path(path)?)
    }

    /// Resolve every parameter in [`PARAMS`] against `source`
    pub fn from_source(source: &impl ParamSource) -> anyhow::Result<Self> {
        let mut config = Config::default();
        for param in PARAMS {
            let value = match source.get(param.name, param.secret) {
                Some(value) => value,
                None => param
                    .default
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("{} is required", param.name))?,
            };
            (param.apply)(&mut config, &value)?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> HashMap<String, String> {
        HashMap::from([
            ("JWT_SECRET_KEY".to_string(), "test-secret".to_string()),
            ("GH_REPO_OWNER".to_string(), "owner".to_string()),
            ("GH_REPO_NAME".to_string(), "repo".to_string()),
        ])
    }

    #[test]
    fn defaults_fill_optional_params() {
        let config = Config::from_source(&required()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_file, "stderr");
        assert_eq!(config.server.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.issue_threshold, Severity::Crash);
        assert!(config.jwt.cert_recheck);
        assert!(config.github.installation_token.is_empty());
    }

    #[test]
    fn missing_required_param_is_named() {
        let mut source = required();
        source.remove("JWT_SECRET_KEY");
        let err = Config::from_source(&source).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET_KEY"));
    }

    #[test]
    fn invalid_number_is_rejected() {
        let mut source = required();
        source.insert("BRS_PORT".to_string(), "eighty".to_string());
        assert!(Config::from_source(&source).is_err());
    }

    #[test]
    fn issue_threshold_must_name_a_severity() {
        let mut source = required();
        source.insert("ISSUE_CREATION_THRESHOLD".to_string(), "bug".to_string());
        let config = Config::from_source(&source).unwrap();
        assert_eq!(config.issue_threshold, Severity::Bug);

        source.insert("ISSUE_CREATION_THRESHOLD".to_string(), "crsh".to_string());
        let err = Config::from_source(&source).unwrap_err();
        assert!(format!("{:#}", err).contains("ISSUE_CREATION_THRESHOLD"));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let config = Config::from_source(&required()).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("test-secret"));
        assert!(printed.contains("[redacted]"));
    }

    #[test]
    fn json_file_source_accepts_non_string_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"JWT_SECRET_KEY":"k","GH_REPO_OWNER":"o","GH_REPO_NAME":"r","BRS_PORT":3333,"CERT_RECHECK":false}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 3333);
        assert!(!config.jwt.cert_recheck);
        assert_eq!(config.github.repo_owner, "o");
    }
}
