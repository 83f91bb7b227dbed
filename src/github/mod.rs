//! GitHub REST client backing developer verification and crash issues.

use crate::{
    auth::{IdentityVerifier, VerifyError},
    issues::{IssueError, IssueTracker, NewIssue},
    utils::config::GitHubConfig,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{header, Client, ClientBuilder, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const ACCEPT: &str = "application/vnd.github+json";
const CONTRIBUTORS_PER_PAGE: usize = 100;

/// Refresh cached installation tokens this long before GitHub expires them
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("request to GitHub failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub answered {status} for {what}")]
    Status { status: u16, what: &'static str },
    #[error("failed to sign app token: {0}")]
    AppToken(#[from] jsonwebtoken::errors::Error),
}

/// How repository-scoped calls authenticate
pub enum InstallationAuth {
    /// Pre-issued installation token
    Static(String),
    /// GitHub App credentials, exchanged for short-lived installation tokens
    App {
        app_id: u64,
        installation_id: u64,
        key: EncodingKey,
    },
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Account {
    login: String,
}

pub struct GitHubService {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    auth: InstallationAuth,
    cached: Mutex<Option<CachedToken>>,
}

impl GitHubService {
    pub fn new(
        api_url: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        auth: InstallationAuth,
        timeout: Duration,
    ) -> Result<Self, GitHubError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(format!("report-server/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            auth,
            cached: Mutex::new(None),
        })
    }

    /// Build from configuration. A static installation token takes precedence
    /// over App credentials.
    pub fn from_config(config: &GitHubConfig, timeout: Duration) -> anyhow::Result<Self> {
        let auth = if !config.installation_token.is_empty() {
            InstallationAuth::Static(config.installation_token.expose().to_string())
        } else if !config.app_key_path.is_empty() {
            let pem = std::fs::read(config.app_key_path.expose())
                .context("failed to read GitHub App key (GH_APP_KEY)")?;
            let key = EncodingKey::from_rsa_pem(&pem)
                .context("GitHub App key (GH_APP_KEY) is not a PEM encoded RSA key")?;
            if config.app_id == 0 || config.install_id == 0 {
                return Err(anyhow!(
                    "GH_APP_ID and GH_INSTALL_ID are required with GH_APP_KEY"
                ));
            }
            InstallationAuth::App {
                app_id: config.app_id,
                installation_id: config.install_id,
                key,
            }
        } else {
            return Err(anyhow!(
                "either GH_INSTALLATION_TOKEN or GH_APP_KEY must be set"
            ));
        };

        Ok(Self::new(
            config.api_url.clone(),
            config.repo_owner.clone(),
            config.repo_name.clone(),
            auth,
            timeout,
        )?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn repo_url(&self, path: &str) -> String {
        self.url(&format!("/repos/{}/{}{}", self.owner, self.repo, path))
    }

    fn get(&self, url: &str, token: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header(header::ACCEPT, ACCEPT)
            .bearer_auth(token)
    }

    /// Installation token for repository calls, minted and cached on demand
    async fn installation_token(&self) -> Result<String, GitHubError> {
        let (app_id, installation_id, key) = match &self.auth {
            InstallationAuth::Static(token) => return Ok(token.clone()),
            InstallationAuth::App {
                app_id,
                installation_id,
                key,
            } => (*app_id, *installation_id, key),
        };

        let mut cached = self.cached.lock().await;
        let refresh_at = Utc::now() + ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > refresh_at) {
            return Ok(token.token.clone());
        }

        let now = Utc::now().timestamp();
        let claims = AppClaims {
            // GitHub tolerates up to 60s of clock drift in either direction
            iat: now - 60,
            exp: now + 9 * 60,
            iss: app_id.to_string(),
        };
        let app_jwt = encode(&Header::new(Algorithm::RS256), &claims, key)?;

        let response = self
            .client
            .post(self.url(&format!(
                "/app/installations/{}/access_tokens",
                installation_id
            )))
            .header(header::ACCEPT, ACCEPT)
            .bearer_auth(app_jwt)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GitHubError::Status {
                status: response.status().as_u16(),
                what: "installation token",
            });
        }

        let minted: InstallationToken = response.json().await?;
        debug!(expires_at = %minted.expires_at, "minted installation token");
        let token = minted.token.clone();
        *cached = Some(CachedToken {
            token: minted.token,
            expires_at: minted.expires_at,
        });
        Ok(token)
    }

    /// Login of the account owning `token`, or `None` if GitHub rejects it
    async fn resolve_login(&self, token: &str) -> Result<Option<String>, GitHubError> {
        let response = self.get(&self.url("/user"), token).send().await?;
        match response.status() {
            status if status.is_success() => Ok(Some(response.json::<Account>().await?.login)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(GitHubError::Status {
                status: status.as_u16(),
                what: "user lookup",
            }),
        }
    }

    async fn is_collaborator(&self, login: &str) -> Result<bool, GitHubError> {
        let token = self.installation_token().await?;
        let response = self
            .get(&self.repo_url(&format!("/collaborators/{}", login)), &token)
            .send()
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(GitHubError::Status {
                status: status.as_u16(),
                what: "collaborator check",
            }),
        }
    }

    async fn is_contributor(&self, login: &str) -> Result<bool, GitHubError> {
        let token = self.installation_token().await?;
        let url = self.repo_url("/contributors");

        for page in 1.. {
            let response = self
                .get(&url, &token)
                .query(&[
                    ("per_page", CONTRIBUTORS_PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?;
            match response.status() {
                // empty repository
                StatusCode::NO_CONTENT => return Ok(false),
                status if status.is_success() => {}
                status => {
                    return Err(GitHubError::Status {
                        status: status.as_u16(),
                        what: "contributor listing",
                    })
                }
            }

            let contributors: Vec<Account> = response.json().await?;
            if contributors.iter().any(|c| c.login == login) {
                return Ok(true);
            }
            if contributors.len() < CONTRIBUTORS_PER_PAGE {
                break;
            }
        }
        Ok(false)
    }
}

fn unavailable(err: GitHubError) -> VerifyError {
    warn!("developer verification failed: {}", err);
    VerifyError::Unavailable(err.to_string())
}

#[async_trait]
impl IdentityVerifier for GitHubService {
    async fn verify_developer(&self, user: &str, token: &str) -> Result<(), VerifyError> {
        let login = self
            .resolve_login(token)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| VerifyError::Unauthorized("GitHub rejected the token".to_string()))?;

        if login != user {
            return Err(VerifyError::Unauthorized(format!(
                "token belongs to {}, not {}",
                login, user
            )));
        }

        if self.is_collaborator(&login).await.map_err(unavailable)?
            || self.is_contributor(&login).await.map_err(unavailable)?
        {
            info!(user = %login, "verified developer");
            Ok(())
        } else {
            Err(VerifyError::Unauthorized(format!(
                "{} is not a collaborator or contributor of {}/{}",
                login, self.owner, self.repo
            )))
        }
    }
}

#[async_trait]
impl IssueTracker for GitHubService {
    async fn file_issue(&self, issue: &NewIssue) -> Result<(), IssueError> {
        let token = self
            .installation_token()
            .await
            .map_err(|e| IssueError::Request(e.to_string()))?;

        let response = self
            .client
            .post(self.repo_url("/issues"))
            .header(header::ACCEPT, ACCEPT)
            .bearer_auth(token)
            .json(issue)
            .send()
            .await
            .map_err(|e| IssueError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IssueError::Rejected(response.status().as_u16()));
        }
        info!(title = %issue.title, "filed issue");
        Ok(())
    }
}
