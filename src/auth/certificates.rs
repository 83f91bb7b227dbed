//! Allow-list of application certificates.

use crate::utils::ApiError;
use async_trait::async_trait;
use std::{
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{fs, sync::RwLock};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate registry unavailable: {0}")]
    StoreUnavailable(#[from] std::io::Error),
}

impl From<CertificateError> for ApiError {
    fn from(err: CertificateError) -> Self {
        tracing::error!("{}", err);
        ApiError::service_unavailable()
    }
}

/// Set of pre-shared certificates. Presence means valid.
#[async_trait]
pub trait CertificateRegistry: Send + Sync {
    /// Whether `cert`, trimmed of surrounding whitespace, is registered
    async fn verify(&self, cert: &str) -> Result<bool, CertificateError>;

    /// Registers `cert`. Adding a certificate that is already present
    /// succeeds without creating a second entry.
    async fn add(&self, cert: &str) -> Result<(), CertificateError>;

    /// Removes every entry equal to `cert`. Absent certificates are a no-op.
    async fn remove(&self, cert: &str) -> Result<(), CertificateError>;
}

/// Newline-delimited certificate file. A missing file is an empty registry.
pub struct FileCertificateRegistry {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileCertificateRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn entries(&self) -> Result<Vec<String>, CertificateError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Replace the file contents via temp file + rename so readers only ever
    /// see the old or the new list.
    async fn store(&self, entries: &[String]) -> Result<(), CertificateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut contents = entries.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CertificateRegistry for FileCertificateRegistry {
    async fn verify(&self, cert: &str) -> Result<bool, CertificateError> {
        let cert = cert.trim();
        if cert.is_empty() {
            return Ok(false);
        }
        let _guard = self.lock.read().await;
        Ok(self.entries().await?.iter().any(|entry| entry == cert))
    }

    async fn add(&self, cert: &str) -> Result<(), CertificateError> {
        let cert = cert.trim();
        if cert.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.write().await;
        let mut entries = self.entries().await?;
        if entries.iter().any(|entry| entry == cert) {
            debug!("certificate already registered");
            return Ok(());
        }
        entries.push(cert.to_string());
        self.store(&entries).await?;
        info!("certificate added ({} registered)", entries.len());
        Ok(())
    }

    async fn remove(&self, cert: &str) -> Result<(), CertificateError> {
        let cert = cert.trim();
        let _guard = self.lock.write().await;
        let mut entries = self.entries().await?;
        let before = entries.len();
        entries.retain(|entry| entry != cert);
        if entries.len() == before {
            return Ok(());
        }
        self.store(&entries).await?;
        info!("certificate removed ({} registered)", entries.len());
        Ok(())
    }
}

/// In-memory registry
#[derive(Default)]
pub struct MemoryCertificateRegistry {
    certs: RwLock<HashSet<String>>,
}

impl MemoryCertificateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_certificates<I, S>(certs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            certs: RwLock::new(certs.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl CertificateRegistry for MemoryCertificateRegistry {
    async fn verify(&self, cert: &str) -> Result<bool, CertificateError> {
        Ok(self.certs.read().await.contains(cert.trim()))
    }

    async fn add(&self, cert: &str) -> Result<(), CertificateError> {
        let cert = cert.trim();
        if !cert.is_empty() {
            self.certs.write().await.insert(cert.to_string());
        }
        Ok(())
    }

    async fn remove(&self, cert: &str) -> Result<(), CertificateError> {
        self.certs.write().await.remove(cert.trim());
        Ok(())
    }
}
