use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Token exchange body. Exactly one credential kind is sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenRequest {
    #[serde(rename = "ghUser", skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(rename = "ghToken", skip_serializing_if = "String::is_empty")]
    pub github_token: String,
    #[serde(rename = "mssCert", skip_serializing_if = "String::is_empty")]
    pub certificate: String,
}

/// Error body returned by the server for every failed request
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub status: String,
    pub description: String,
}

/// Reports keyed by store key. `partial` is set when the server could only
/// read some of them.
#[derive(Debug, Clone)]
pub struct ReportListing {
    pub reports: BTreeMap<String, Value>,
    pub partial: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedKeys {
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Which reports a `get` selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportQuery {
    All,
    Group(String),
    Severity(String),
    Key(String),
}
