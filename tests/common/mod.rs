#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, Method, StatusCode},
    Router,
};
use report_server::{
    auth::{
        CertificateRegistry, Grant, IdentityVerifier, MemoryCertificateRegistry, TokenService,
        VerifyError,
    },
    create_app,
    issues::{IssueError, IssueTracker, NewIssue},
    store::{MemoryBackend, ReportStore},
    AppState, Config,
};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tower::ServiceExt;

pub const SECRET: &str = "test-jwt-secret-key-for-testing-only";
pub const DEV_USER: &str = "octocat";
pub const DEV_TOKEN: &str = "gho_valid";
pub const APP_CERT: &str = "registered-cert";

/// How the mock identity provider answers
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum VerifierMode {
    Normal,
    Unavailable,
    Hang,
}

/// Accepts exactly one developer: [`DEV_USER`] with [`DEV_TOKEN`]
pub struct MockVerifier {
    pub mode: VerifierMode,
}

#[async_trait]
impl IdentityVerifier for MockVerifier {
    async fn verify_developer(&self, user: &str, token: &str) -> Result<(), VerifyError> {
        match self.mode {
            VerifierMode::Unavailable => Err(VerifyError::Unavailable("down".to_string())),
            VerifierMode::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
            VerifierMode::Normal if user == DEV_USER && token == DEV_TOKEN => Ok(()),
            VerifierMode::Normal => Err(VerifyError::Unauthorized("unknown".to_string())),
        }
    }
}

/// Records every issue it is asked to file
#[derive(Default)]
pub struct RecordingTracker {
    pub filed: Mutex<Vec<NewIssue>>,
    pub fail: bool,
}

impl RecordingTracker {
    pub fn filed(&self) -> Vec<NewIssue> {
        self.filed.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for RecordingTracker {
    async fn file_issue(&self, issue: &NewIssue) -> Result<(), IssueError> {
        self.filed.lock().unwrap().push(issue.clone());
        if self.fail {
            Err(IssueError::Rejected(500))
        } else {
            Ok(())
        }
    }
}

pub struct TestOptions {
    pub verifier: VerifierMode,
    pub tracker_fails: bool,
    pub cert_recheck: bool,
    pub params: Vec<(&'static str, &'static str)>,
    /// Registry backing the token service instead of the seeded memory one
    pub registry: Option<Arc<dyn CertificateRegistry>>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            verifier: VerifierMode::Normal,
            tracker_fails: false,
            cert_recheck: true,
            params: Vec::new(),
            registry: None,
        }
    }
}

pub struct TestContext {
    pub app: Router,
    pub store: ReportStore,
    pub tokens: Arc<TokenService>,
    pub certificates: Arc<MemoryCertificateRegistry>,
    pub issues: Arc<RecordingTracker>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_options(TestOptions::default())
    }

    pub fn with_options(options: TestOptions) -> Self {
        let mut params: HashMap<String, String> = [
            ("JWT_SECRET_KEY", SECRET),
            ("GH_REPO_OWNER", "owner"),
            ("GH_REPO_NAME", "repo"),
            ("STORAGE_BACKEND", "memory"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (name, value) in options.params {
            params.insert(name.to_string(), value.to_string());
        }
        let config = Arc::new(Config::from_source(&params).expect("test config"));

        let store = ReportStore::new(Arc::new(MemoryBackend::new()));
        let certificates = Arc::new(MemoryCertificateRegistry::with_certificates([APP_CERT]));
        let registry = options
            .registry
            .unwrap_or_else(|| certificates.clone() as Arc<dyn CertificateRegistry>);
        let tokens = Arc::new(
            TokenService::new(
                SECRET.as_bytes(),
                registry,
                Arc::new(MockVerifier {
                    mode: options.verifier,
                }),
            )
            .with_timeout(Duration::from_millis(200))
            .with_certificate_recheck(options.cert_recheck),
        );
        let issues = Arc::new(RecordingTracker {
            fail: options.tracker_fails,
            ..Default::default()
        });

        let app = create_app(AppState {
            store: store.clone(),
            tokens: tokens.clone(),
            issues: issues.clone(),
            config,
        });

        Self {
            app,
            store,
            tokens,
            certificates,
            issues,
        }
    }

    pub fn developer_token(&self) -> String {
        self.tokens
            .issue(Grant::Developer {
                username: DEV_USER.to_string(),
                github_token: DEV_TOKEN.to_string(),
            })
            .unwrap()
    }

    pub fn application_token(&self, certificate: &str) -> String {
        self.tokens
            .issue(Grant::Application {
                certificate: certificate.to_string(),
            })
            .unwrap()
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Bytes) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => {
                let body = body.to_string();
                request
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::CONTENT_LENGTH, body.len())
                    .body(Body::from(body))
                    .unwrap()
            }
            None => request.body(Body::empty()).unwrap(),
        };
        self.send_request(request).await
    }

    pub async fn send_request(&self, request: Request) -> (StatusCode, Bytes) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }
}

pub fn json(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}
