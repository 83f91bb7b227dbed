use crate::{
    auth::AuthContext,
    issues::NewIssue,
    models::{DeletedKeys, Receipt, Report, Severity},
    store::{BatchRead, BatchStatus},
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::{debug, info, warn};
use validator::Validate;

/// Store a report and return its receipt. Reports at or above the configured
/// severity threshold also file an issue; failing to file it does not fail
/// the request.
pub async fn post_report(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthContext>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = body?;
    let report: Report = serde_json::from_slice(&body)?;
    report.validate().map_err(|e| {
        debug!("rejected report: {}", e);
        ApiError::bad_request("Invalid report")
    })?;

    let (key, bytes) = state.store.create(&report)?;
    state.store.write(&key, &bytes).await?;
    info!(
        gid = %report.gid,
        severity = %report.severity,
        audience = caller.audience.as_str(),
        "stored report {}",
        key
    );

    let receipt = Receipt {
        gid: report.gid,
        key,
    };
    if report.severity >= state.config.issue_threshold {
        file_issue(&state, &receipt).await;
    }

    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn file_issue(state: &AppState, receipt: &Receipt) {
    let issue = NewIssue::for_crash(receipt);
    let timeout = state.config.request_timeout;
    match tokio::time::timeout(timeout, state.issues.file_issue(&issue)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("failed to file issue for {}: {}", receipt.key, e),
        Err(_) => warn!(
            "filing issue for {} timed out after {:?}",
            receipt.key, timeout
        ),
    }
}

/// Listing responses: the batch status decides the code, the body is the
/// key to report map
fn listing(batch: BatchRead) -> Response {
    (batch.status.status_code(), Json(batch.reports)).into_response()
}

fn no_reports() -> ApiError {
    ApiError::not_found("No reports found")
}

pub async fn get_all_reports(State(state): State<AppState>) -> ApiResult<Response> {
    let keys = state.store.all_keys().await;
    if keys.is_empty() {
        return Err(no_reports());
    }
    Ok(listing(state.store.batch_read(&keys).await))
}

pub async fn get_group_reports(
    State(state): State<AppState>,
    Path(gid): Path<String>,
) -> ApiResult<Response> {
    let keys = state.store.group_keys(&gid).await;
    if keys.is_empty() {
        return Err(no_reports());
    }
    Ok(listing(state.store.batch_read(&keys).await))
}

/// Reports of one severity, filtered after reading every report
pub async fn get_severity_reports(
    State(state): State<AppState>,
    Path(slvl): Path<String>,
) -> ApiResult<Response> {
    let severity = Severity::from_param(&slvl);
    let keys = state.store.all_keys().await;
    if keys.is_empty() {
        return Err(no_reports());
    }

    let mut batch = state.store.batch_read(&keys).await;
    batch.reports.retain(|_, report| report.severity == severity);
    if batch.reports.is_empty() && batch.status == BatchStatus::Ok {
        return Err(no_reports());
    }
    Ok(listing(batch))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<Report>> {
    Ok(Json(state.store.read_report(&key).await?))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(gid): Path<String>,
) -> ApiResult<Json<DeletedKeys>> {
    let deleted = state.store.delete_group(&gid).await?;
    info!(gid = %gid, count = deleted.len(), "deleted report group");
    Ok(Json(DeletedKeys { deleted }))
}

pub async fn delete_report(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.erase(&key).await?;
    info!("deleted report {}", key);
    Ok(StatusCode::NO_CONTENT)
}
