use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    /// The credentials are valid but do not belong to an authorized developer,
    /// or they were rejected outright.
    #[error("developer not authorized: {0}")]
    Unauthorized(String),
    /// The identity provider could not answer.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Confirms that an external account token belongs to an authorized developer.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Succeeds only if `token` is valid, resolves to an account that is
    /// allowed to use the service, and that account's name equals `user`
    /// exactly.
    async fn verify_developer(&self, user: &str, token: &str) -> Result<(), VerifyError>;
}
