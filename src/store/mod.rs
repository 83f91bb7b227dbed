//! Content-addressed report storage.
//!
//! A [`ReportStore`] computes a deterministic key for every report
//! (`<gid>/<sha256>.json`) and persists the serialized bytes through a
//! [`Backend`], which only has to provide atomic single-key operations and a
//! prefix scan. The group id doubles as the key's path prefix, so listing a
//! group is a prefix scan.

mod fs;
mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

use crate::{models::Report, utils::ApiError};
use async_trait::async_trait;
use axum::http::StatusCode;
use futures::{stream::BoxStream, StreamExt};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

/// File extension of stored reports
pub const REPORT_EXTENSION: &str = ".json";

/// Lazily produced keys. Finite, unordered and consumed once.
pub type KeyStream = BoxStream<'static, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no entry stored under key {0}")]
    NotFound(String),
    #[error("invalid store key {0:?}")]
    InvalidKey(String),
    #[error("failed to serialize report: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("failed to decode entry {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::InvalidKey(_) => {
                debug!("{}", err);
                ApiError::not_found("Not Found")
            }
            _ => {
                tracing::error!("store failure: {}", err);
                ApiError::internal_error("Internal Server Error")
            }
        }
    }
}

/// Key/value medium underneath a [`ReportStore`].
#[async_trait]
pub trait Backend: Send + Sync {
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] when nothing is stored under `key`.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn has(&self, key: &str) -> bool;

    async fn erase(&self, key: &str) -> Result<(), StoreError>;

    /// Every key starting with `prefix`. An empty prefix yields all keys.
    async fn keys_with_prefix(&self, prefix: &str) -> KeyStream;
}

/// Outcome of a [`ReportStore::batch_read`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every requested key was read and decoded
    Ok,
    /// Some keys failed; only the successes are returned
    PartialContent,
    /// Every requested key failed
    InternalError,
}

impl BatchStatus {
    pub fn status_code(self) -> StatusCode {
        match self {
            BatchStatus::Ok => StatusCode::OK,
            BatchStatus::PartialContent => StatusCode::PARTIAL_CONTENT,
            BatchStatus::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub struct BatchRead {
    pub reports: BTreeMap<String, Report>,
    pub status: BatchStatus,
}

/// Report persistence over an injected [`Backend`]
#[derive(Clone)]
pub struct ReportStore {
    backend: Arc<dyn Backend>,
}

impl ReportStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Serialize `report` and compute its content address. Nothing is
    /// persisted; pass the result to [`ReportStore::write`].
    pub fn create(&self, report: &Report) -> Result<(String, Vec<u8>), StoreError> {
        let bytes = serde_json::to_vec(&report.body()).map_err(StoreError::Serialization)?;
        let hash = format!("{:x}", Sha256::digest(&bytes));
        let key = format!("{}/{}{}", report.gid, hash, REPORT_EXTENSION);
        Ok((key, bytes))
    }

    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.backend.write(key, bytes).await
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.backend.read(key).await
    }

    pub async fn has(&self, key: &str) -> bool {
        self.backend.has(key).await
    }

    pub async fn erase(&self, key: &str) -> Result<(), StoreError> {
        self.backend.erase(key).await
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> KeyStream {
        self.backend.keys_with_prefix(prefix).await
    }

    /// All keys in the group `gid`
    pub async fn group_keys(&self, gid: &str) -> Vec<String> {
        self.keys_with_prefix(&format!("{}/", gid)).await.collect().await
    }

    pub async fn all_keys(&self) -> Vec<String> {
        self.keys_with_prefix("").await.collect().await
    }

    /// Read and decode one report. The returned report carries its key.
    pub async fn read_report(&self, key: &str) -> Result<Report, StoreError> {
        let bytes = self.read(key).await?;
        let mut report: Report =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            })?;
        report.key = key.to_string();
        Ok(report)
    }

    /// Best-effort read of every key. Failed keys are logged and left out of
    /// the result; see [`BatchStatus`] for how failures are summarized.
    pub async fn batch_read(&self, keys: &[String]) -> BatchRead {
        let mut reports = BTreeMap::new();
        let mut failures = 0usize;

        for key in keys {
            match self.read_report(key).await {
                Ok(report) => {
                    reports.insert(key.clone(), report);
                }
                Err(err) => {
                    warn!("failed to retrieve report (k={}): {}", key, err);
                    failures += 1;
                }
            }
        }

        let status = if failures == 0 {
            BatchStatus::Ok
        } else if failures < keys.len() {
            BatchStatus::PartialContent
        } else {
            reports.clear();
            BatchStatus::InternalError
        };
        debug!(requested = keys.len(), failures, ?status, "batch read finished");

        BatchRead { reports, status }
    }

    /// Erase every report in `gid`, returning the listed keys. Keys that
    /// vanish before their erase count as deleted.
    pub async fn delete_group(&self, gid: &str) -> Result<Vec<String>, StoreError> {
        let keys = self.group_keys(gid).await;
        if keys.is_empty() {
            return Err(StoreError::NotFound(gid.to_string()));
        }
        for key in &keys {
            match self.erase(key).await {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => debug!("{} already erased", key),
                Err(err) => return Err(err),
            }
        }
        Ok(keys)
    }
}

/// Checks a key is a relative, `/`-separated path without empty, hidden or
/// parent segments.
pub(crate) fn validate_key(key: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = key.split('/').collect();
    let valid = !key.is_empty()
        && segments
            .iter()
            .all(|s| !s.is_empty() && !s.starts_with('.') && !s.contains('\\'));
    if valid {
        Ok(segments)
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
