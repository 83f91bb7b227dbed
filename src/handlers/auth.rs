use crate::{
    models::TokenRequest,
    utils::ApiResult,
    AppState,
};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

/// Exchange a GitHub user + OAuth token, or an application certificate, for
/// a signed token. The token is returned as plain text.
pub async fn exchange_token(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = body?;
    let request: TokenRequest = serde_json::from_slice(&body)?;
    let token = state.tokens.exchange_token(&request).await?;
    Ok((StatusCode::CREATED, token))
}

/// Register an application certificate
pub async fn add_certificate(
    State(state): State<AppState>,
    Path(cert): Path<String>,
) -> ApiResult<StatusCode> {
    state.tokens.certificates().add(&cert).await?;
    info!("certificate registered");
    Ok(StatusCode::CREATED)
}

/// Revoke an application certificate
pub async fn remove_certificate(
    State(state): State<AppState>,
    Path(cert): Path<String>,
) -> ApiResult<StatusCode> {
    state.tokens.certificates().remove(&cert).await?;
    info!("certificate revoked");
    Ok(StatusCode::NO_CONTENT)
}
