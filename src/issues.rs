//! Bug tracker side effects of report creation.

use crate::models::Receipt;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub const CRASH_LABEL: &str = "Critical";

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("issue tracker request failed: {0}")]
    Request(String),
    #[error("issue tracker rejected the issue with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

impl NewIssue {
    /// Issue filed for a stored crash report
    pub fn for_crash(receipt: &Receipt) -> Self {
        Self {
            title: format!("{} {}", receipt.gid, receipt.key),
            body: format!("---- Automated Crash Report ----\n\nKey: {}", receipt.key),
            labels: vec![CRASH_LABEL.to_string()],
        }
    }
}

/// Files issues in an external bug tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn file_issue(&self, issue: &NewIssue) -> Result<(), IssueError>;
}
