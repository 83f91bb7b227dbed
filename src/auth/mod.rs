pub mod certificates;
pub mod identity;

pub use certificates::{
    CertificateError, CertificateRegistry, FileCertificateRegistry, MemoryCertificateRegistry,
};
pub use identity::{IdentityVerifier, VerifyError};

use crate::{models::TokenRequest, utils::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info};

/// `iss` claim of every token this service signs
pub const ISSUER: &str = "report-server";

/// Tokens expire one year after issue
pub const TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Default bound for outbound verification calls
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Who a token was issued to. Decides the authorization tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Non-human caller holding a registered certificate
    Application,
    /// Human developer verified through GitHub
    Developer,
}

impl Audience {
    pub fn as_str(self) -> &'static str {
        match self {
            Audience::Application => "application",
            Audience::Developer => "developer",
        }
    }
}

/// Audience-specific claims. A token carries exactly one shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grant {
    Developer {
        #[serde(rename = "ghuname")]
        username: String,
        #[serde(rename = "ghtkn")]
        github_token: String,
    },
    Application {
        #[serde(rename = "mssCert")]
        certificate: String,
    },
}

impl Grant {
    pub fn audience(&self) -> Audience {
        match self {
            Grant::Developer { .. } => Audience::Developer,
            Grant::Application { .. } => Audience::Application,
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub aud: Audience,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub grant: Grant,
}

/// Validated caller identity, stored in the request extensions by
/// [`authenticate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub audience: Audience,
    pub grant: Grant,
}

impl AuthContext {
    /// Developer tier: developer audience with both GitHub claims present
    pub fn is_developer(&self) -> bool {
        self.audience == Audience::Developer
            && matches!(
                &self.grant,
                Grant::Developer { username, github_token }
                    if !username.is_empty() && !github_token.is_empty()
            )
    }

    pub fn username(&self) -> Option<&str> {
        match &self.grant {
            Grant::Developer { username, .. } => Some(username),
            Grant::Application { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request had both an application certificate and GitHub credentials")]
    ConflictingCredentialKinds,
    #[error("token request requires a GitHub username and OAuth token")]
    IncompleteCredentialRequest,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("dependency unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ConflictingCredentialKinds => ApiError::bad_request(
                "Supply an application certificate or a GitHub user + OAuth token. Not both.",
            ),
            AuthError::IncompleteCredentialRequest => {
                ApiError::bad_request("Authentication requires a GitHub username and OAuth token")
            }
            AuthError::Unauthorized(_) | AuthError::InvalidToken(_) => {
                debug!("request rejected: {}", err);
                ApiError::unauthorized()
            }
            AuthError::ServiceUnavailable(_) => {
                error!("request failed: {}", err);
                ApiError::service_unavailable()
            }
        }
    }
}

/// Issues and validates signed tokens for the two audiences
pub struct TokenService {
    certificates: Arc<dyn CertificateRegistry>,
    identity: Arc<dyn IdentityVerifier>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    verify_timeout: Duration,
    recheck_certificates: bool,
}

impl TokenService {
    pub fn new(
        secret: &[u8],
        certificates: Arc<dyn CertificateRegistry>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            certificates,
            identity,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
            recheck_certificates: true,
        }
    }

    /// Bound for the identity and registry lookups made per request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Whether application tokens are rejected once their certificate has
    /// been removed from the registry
    pub fn with_certificate_recheck(mut self, recheck: bool) -> Self {
        self.recheck_certificates = recheck;
        self
    }

    pub fn certificates(&self) -> &Arc<dyn CertificateRegistry> {
        &self.certificates
    }

    /// Exchange one kind of credential for a signed token
    pub async fn exchange_token(&self, request: &TokenRequest) -> Result<String, AuthError> {
        let has_cert = !request.certificate.is_empty();
        let has_user = !request.user.is_empty();
        let has_github_token = !request.github_token.is_empty();

        if has_cert && (has_user || has_github_token) {
            return Err(AuthError::ConflictingCredentialKinds);
        }
        if !has_cert && !(has_user && has_github_token) {
            return Err(AuthError::IncompleteCredentialRequest);
        }

        let grant = if has_cert {
            self.verify_certificate(&request.certificate).await?;
            Grant::Application {
                certificate: request.certificate.clone(),
            }
        } else {
            self.verify_developer(&request.user, &request.github_token)
                .await?;
            Grant::Developer {
                username: request.user.clone(),
                github_token: request.github_token.clone(),
            }
        };

        let token = self.issue(grant)?;
        if token.is_empty() {
            return Err(AuthError::ServiceUnavailable(
                "signed token was empty".to_string(),
            ));
        }
        Ok(token)
    }

    /// Sign a token for `grant`, valid from now for one year
    pub fn issue(&self, grant: Grant) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let audience = grant.audience();
        let claims = Claims {
            aud: audience,
            iss: ISSUER.to_string(),
            iat: now,
            nbf: now,
            exp: now + TOKEN_LIFETIME_SECS,
            grant,
        };

        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)
            .map_err(|e| AuthError::ServiceUnavailable(format!("failed to sign token: {e}")))?;
        info!(audience = audience.as_str(), "issued token");
        Ok(token)
    }

    /// Check signature, issuer, time window and audience, and that the claim
    /// shape matches the audience
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.set_audience(&[Audience::Application.as_str(), Audience::Developer.as_str()]);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "nbf", "aud", "iss"]);
        validation.validate_nbf = true;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;
        if claims.grant.audience() != claims.aud {
            return Err(AuthError::Unauthorized(
                "token claims do not match its audience".to_string(),
            ));
        }
        Ok(claims)
    }

    /// Validate `token` and resolve the caller's [`AuthContext`]
    pub async fn authorize(&self, token: &str) -> Result<AuthContext, AuthError> {
        let claims = self.validate(token)?;
        if self.recheck_certificates {
            if let Grant::Application { certificate } = &claims.grant {
                self.verify_certificate(certificate).await?;
            }
        }
        Ok(AuthContext {
            audience: claims.aud,
            grant: claims.grant,
        })
    }

    async fn verify_certificate(&self, certificate: &str) -> Result<(), AuthError> {
        match self
            .bounded(self.certificates.verify(certificate))
            .await?
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::Unauthorized(
                "certificate is not registered".to_string(),
            )),
            Err(e) => Err(AuthError::ServiceUnavailable(e.to_string())),
        }
    }

    async fn verify_developer(&self, user: &str, github_token: &str) -> Result<(), AuthError> {
        match self
            .bounded(self.identity.verify_developer(user, github_token))
            .await?
        {
            Ok(()) => Ok(()),
            Err(VerifyError::Unauthorized(reason)) => Err(AuthError::Unauthorized(reason)),
            Err(VerifyError::Unavailable(reason)) => Err(AuthError::ServiceUnavailable(reason)),
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = T>) -> Result<T, AuthError> {
        tokio::time::timeout(self.verify_timeout, call)
            .await
            .map_err(|_| {
                AuthError::ServiceUnavailable(format!(
                    "verification timed out after {:?}",
                    self.verify_timeout
                ))
            })
    }
}

/// Extract the bearer token from the `Authorization` header, falling back
/// to a `jwt` cookie
pub fn extract_auth_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            scheme
                .eq_ignore_ascii_case("bearer")
                .then(|| token.trim().to_string())
        })
        .filter(|token| !token.is_empty());

    from_header.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|cookie| cookie.trim().split_once('='))
            .find(|(name, value)| *name == "jwt" && !value.is_empty())
            .map(|(_, value)| value.to_string())
    })
}

/// Authentication middleware: admits application and developer tokens
pub async fn authenticate(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_auth_token(request.headers()).ok_or_else(ApiError::unauthorized)?;
    let context = tokens.authorize(&token).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Developer-only gate. Must run after [`authenticate`].
pub async fn require_developer(request: Request, next: Next) -> Result<Response, ApiError> {
    match request.extensions().get::<AuthContext>() {
        Some(context) if context.is_developer() => Ok(next.run(request).await),
        _ => Err(ApiError::unauthorized()),
    }
}
