use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Category of a failed request. Each kind maps to exactly one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    NotFound,
    PayloadTooLarge,
    InternalError,
    ServiceUnavailable,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// API error. Only `description` is ever shown to callers, so it must be a
/// pre-set safe message and never an internal cause.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub description: String,
}

/// JSON body sent for every failed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub status: String,
    pub description: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.description)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let status = self.status();
        ErrorEnvelope {
            code: status.as_u16(),
            status: status.canonical_reason().unwrap_or_default().to_string(),
            description: self.description.clone(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Unauthorized, "Unauthorized")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    pub fn service_unavailable() -> Self {
        Self::new(ErrorKind::ServiceUnavailable, "Service Unavailable")
    }

    pub fn payload_too_large() -> Self {
        Self::new(ErrorKind::PayloadTooLarge, "Request payload too large")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::debug!("JSON format error: {}", err);
        Self::bad_request("JSON format error")
    }
}

/// Body buffering failures, most often a body over `DefaultBodyLimit` that
/// declared no length
impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        tracing::debug!("failed to read request body: {}", rejection.body_text());
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::payload_too_large()
        } else {
            Self::bad_request("Failed to read request body")
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::internal_error("Internal Server Error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_code_status_and_description() {
        let envelope = ApiError::bad_request("Supply one credential kind").envelope();
        assert_eq!(envelope.code, 400);
        assert_eq!(envelope.status, "Bad Request");
        assert_eq!(envelope.description, "Supply one credential kind");
    }

    #[test]
    fn every_kind_has_a_distinct_status() {
        let kinds = [
            ErrorKind::BadRequest,
            ErrorKind::Unauthorized,
            ErrorKind::NotFound,
            ErrorKind::PayloadTooLarge,
            ErrorKind::InternalError,
            ErrorKind::ServiceUnavailable,
        ];
        let mut codes: Vec<u16> = kinds.iter().map(|k| k.status().as_u16()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn json_errors_do_not_leak_parser_details() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let api: ApiError = err.into();
        assert_eq!(api.kind, ErrorKind::BadRequest);
        assert_eq!(api.description, "JSON format error");
    }
}
