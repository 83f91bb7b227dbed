use crate::api::types::*;
use crate::config::Config;
use crate::utils::error::{CliError, CliResult};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for API client retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// HTTP client for the report server
pub struct ApiClient {
    client: Client,
    base_url: String,
    jwt: Option<String>,
    retry_config: RetryConfig,
}

impl ApiClient {
    /// Create a new API client from configuration
    pub fn new(config: &Config) -> CliResult<Self> {
        let retry_config = RetryConfig {
            max_retries: config.retry.max_retries,
            initial_delay: Duration::from_millis(config.retry.initial_delay_ms),
            max_delay: Duration::from_millis(config.retry.max_delay_ms),
            backoff_multiplier: config.retry.backoff_multiplier,
        };
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(format!("reportctl/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            jwt: config.jwt.clone(),
            retry_config,
        })
    }

    pub fn has_token(&self) -> bool {
        self.jwt.is_some()
    }

    /// Use `jwt` for every following request
    pub fn set_token(&mut self, jwt: String) {
        self.jwt = Some(jwt);
    }

    /// Exchange credentials for a signed token
    pub async fn exchange_token(&self, request: &TokenRequest) -> CliResult<String> {
        let url = format!("{}/token", self.base_url);

        // credential exchanges are not retried
        let response = self.client.post(&url).json(request).send().await?;
        let response = Self::check(response).await?;
        let token = response.text().await?.trim().to_string();
        if token.is_empty() {
            return Err(CliError::Auth("Server returned an empty token".to_string()));
        }
        Ok(token)
    }

    /// Check the health status of the server
    pub async fn health_check(&self) -> CliResult<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        self.make_request_with_retry(|| async {
            let response = self.client.get(&url).send().await?;
            Ok(Self::check(response).await?.json().await?)
        })
        .await
    }

    /// Fetch reports. A single key yields a one-entry listing.
    pub async fn get_reports(&self, query: &ReportQuery) -> CliResult<ReportListing> {
        let url = match query {
            ReportQuery::All => format!("{}/report", self.base_url),
            ReportQuery::Group(gid) => {
                format!("{}/report/group/{}", self.base_url, urlencoding::encode(gid))
            }
            ReportQuery::Severity(slvl) => {
                format!("{}/report/severity/{}", self.base_url, urlencoding::encode(slvl))
            }
            ReportQuery::Key(key) => {
                let report: serde_json::Value = self.get_json(&self.key_url(key)?).await?;
                return Ok(ReportListing {
                    reports: BTreeMap::from([(key.clone(), report)]),
                    partial: false,
                });
            }
        };

        self.make_request_with_retry(|| async {
            let response = self.authorized(self.client.get(&url))?.send().await?;
            let response = Self::check(response).await?;
            let partial = response.status() == StatusCode::PARTIAL_CONTENT;
            Ok(ReportListing {
                reports: response.json().await?,
                partial,
            })
        })
        .await
    }

    /// Delete every report in a group, returning the removed keys
    pub async fn delete_group(&self, gid: &str) -> CliResult<Vec<String>> {
        let url = format!("{}/report/group/{}", self.base_url, urlencoding::encode(gid));
        self.make_request_with_retry(|| async {
            let response = self.authorized(self.client.delete(&url))?.send().await?;
            let deleted: DeletedKeys = Self::check(response).await?.json().await?;
            Ok(deleted.deleted)
        })
        .await
    }

    pub async fn delete_report(&self, key: &str) -> CliResult<()> {
        let url = self.key_url(key)?;
        self.make_request_with_retry(|| async {
            let response = self.authorized(self.client.delete(&url))?.send().await?;
            Self::check(response).await?;
            Ok(())
        })
        .await
    }

    pub async fn add_certificate(&self, cert: &str) -> CliResult<()> {
        let url = self.certificate_url(cert)?;
        self.make_request_with_retry(|| async {
            let response = self.authorized(self.client.post(&url))?.send().await?;
            Self::check(response).await?;
            Ok(())
        })
        .await
    }

    pub async fn remove_certificate(&self, cert: &str) -> CliResult<()> {
        let url = self.certificate_url(cert)?;
        self.make_request_with_retry(|| async {
            let response = self.authorized(self.client.delete(&url))?.send().await?;
            Self::check(response).await?;
            Ok(())
        })
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> CliResult<T> {
        self.make_request_with_retry(|| async {
            let response = self.authorized(self.client.get(url))?.send().await?;
            Ok(Self::check(response).await?.json().await?)
        })
        .await
    }

    fn key_url(&self, key: &str) -> CliResult<String> {
        if key.trim().is_empty() {
            return Err(CliError::InvalidArgument("Report key cannot be empty".to_string()));
        }
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Ok(format!("{}/report/key/{}", self.base_url, encoded.join("/")))
    }

    fn certificate_url(&self, cert: &str) -> CliResult<String> {
        if cert.trim().is_empty() {
            return Err(CliError::InvalidArgument("Certificate cannot be empty".to_string()));
        }
        Ok(format!(
            "{}/certificate/{}",
            self.base_url,
            urlencoding::encode(cert.trim())
        ))
    }

    fn authorized(&self, request: RequestBuilder) -> CliResult<RequestBuilder> {
        let token = self.jwt.as_ref().ok_or_else(|| {
            CliError::Auth(
                "No token available. Pass --jwt, or --user and --oauth to obtain one."
                    .to_string(),
            )
        })?;
        Ok(request.bearer_auth(token))
    }

    /// Pass successful responses through; turn failures into
    /// [`CliError::Api`] carrying the envelope description
    async fn check(response: Response) -> CliResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.description)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            });
        Err(CliError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Make HTTP request with retry logic
    async fn make_request_with_retry<T, F, Fut>(&self, request_fn: F) -> CliResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = CliResult<T>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_config.initial_delay;

        loop {
            attempts += 1;

            match request_fn().await {
                Ok(result) => return Ok(result),
                Err(e) if attempts <= self.retry_config.max_retries && self.should_retry(&e) => {
                    sleep(delay).await;
                    delay = std::cmp::min(
                        Duration::from_millis(
                            (delay.as_millis() as f64 * self.retry_config.backoff_multiplier)
                                as u64,
                        ),
                        self.retry_config.max_delay,
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Determine if an error should trigger a retry
    fn should_retry(&self, error: &CliError) -> bool {
        match error {
            CliError::Http(e) => e.is_timeout() || e.is_connect(),
            CliError::Api { status, .. } => (500..600).contains(status) || *status == 408,
            _ => false,
        }
    }
}
