use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt};
use validator::{Validate, ValidationError};

/// How bad a reported problem is. Ordered, so thresholds can be compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    #[default]
    Unknown = 0,
    Bug = 1,
    Crash = 2,
}

impl Severity {
    /// Lenient parse used for path segments and config values:
    /// `"1"`/`"bug"` and `"2"`/`"crash"`, anything else is `Unknown`.
    pub fn from_param(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "bug" => Severity::Bug,
            "2" | "crash" => Severity::Crash,
            _ => Severity::Unknown,
        }
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Severity::Unknown),
            1 => Some(Severity::Bug),
            2 => Some(Severity::Crash),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Unknown => "unknown",
            Severity::Bug => "bug",
            Severity::Crash => "crash",
        };
        f.write_str(name)
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SeverityVisitor;

        impl<'de> de::Visitor<'de> for SeverityVisitor {
            type Value = Severity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a severity code (0-2) or name (unknown, bug, crash)")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Severity, E> {
                Severity::from_code(v).ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Severity, E> {
                u64::try_from(v)
                    .ok()
                    .and_then(Severity::from_code)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Severity, E> {
                match v.to_ascii_lowercase().as_str() {
                    "unknown" => Ok(Severity::Unknown),
                    "bug" => Ok(Severity::Bug),
                    "crash" => Ok(Severity::Crash),
                    _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(SeverityVisitor)
    }
}

/// A submitted report. `key` is assigned by the store and is never part of
/// the content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Report {
    #[validate(length(min = 1, max = 128), custom = "validate_gid")]
    pub gid: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub content: Map<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

fn validate_gid(gid: &str) -> Result<(), ValidationError> {
    if gid.contains('/') || gid.starts_with('.') || gid.trim() != gid {
        return Err(ValidationError::new("gid"));
    }
    Ok(())
}

/// The hashed portion of a report
#[derive(Serialize)]
pub(crate) struct ReportBody<'a> {
    pub gid: &'a str,
    pub severity: Severity,
    pub content: Value,
}

impl Report {
    pub fn new(gid: impl Into<String>, severity: Severity, content: Map<String, Value>) -> Self {
        Self {
            gid: gid.into(),
            severity,
            content,
            key: String::new(),
        }
    }

    /// Content with object keys sorted at every depth, so that the same
    /// logical report always serializes to the same bytes.
    pub(crate) fn body(&self) -> ReportBody<'_> {
        ReportBody {
            gid: &self.gid,
            severity: self.severity,
            content: canonical(&Value::Object(self.content.clone())),
        }
    }
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonical(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Confirmation returned after a report was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub gid: String,
    pub key: String,
}

/// Body of a token exchange. Exactly one credential kind must be supplied:
/// a GitHub user + OAuth token, or an application certificate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRequest {
    #[serde(rename = "ghUser", default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(rename = "ghToken", default, skip_serializing_if = "String::is_empty")]
    pub github_token: String,
    #[serde(rename = "mssCert", default, skip_serializing_if = "String::is_empty")]
    pub certificate: String,
}

/// Keys removed by a group deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedKeys {
    pub deleted: Vec<String>,
}
