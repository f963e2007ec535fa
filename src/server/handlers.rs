//! Route handlers: the two download endpoints plus health and report types

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::application::ReportError;
use crate::domain::{ReattemptOption, ReportType, RunResult, RunStatus};

use super::json_error;
use super::request::{DownloadQuery, RequestError};
use super::state::AppState;

/// Success body of both download endpoints
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub status: RunStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_type: Option<ReportType>,
    pub files_downloaded: usize,
    pub download_directory: String,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reattempt_options: Vec<ReattemptOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl From<RunResult> for DownloadResponse {
    fn from(result: RunResult) -> Self {
        Self {
            status: result.status,
            start_date: result.start_date,
            end_date: result.end_date,
            report_type: result.report_type,
            files_downloaded: result.total_saved,
            download_directory: result.download_directory.display().to_string(),
            messages: result.messages,
            prompt: result.prompt,
            reattempt_options: result.reattempt_options,
            attempts: result.attempts,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportTypeEntry {
    code: u8,
    name: &'static str,
}

fn bad_request(err: &RequestError) -> Response {
    warn!("Rejected download request: {}", err);
    json_error(StatusCode::BAD_REQUEST, &err.to_string()).into_response()
}

/// 200 with the run summary, or 500 carrying the failure and the partial log
fn run_response(result: RunResult) -> Response {
    if result.status != RunStatus::Failure {
        return (StatusCode::OK, Json(DownloadResponse::from(result))).into_response();
    }

    let failure = result.failure.as_deref().unwrap_or("unknown error");
    let detail = format!("Error during download: {failure}");
    error!("{} run failed: {}", result.portal, failure);
    let body = serde_json::json!({
        "detail": detail,
        "messages": result.messages,
        "files_downloaded": result.total_saved,
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// POST /download-nip-report
pub async fn handle_download_nip(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let request = match query.nip_request() {
        Ok(request) => request,
        Err(e) => return bad_request(&e),
    };
    info!(
        "📥 NIP download requested for {} → {}",
        request.start_date, request.end_date
    );
    run_response(state.service.download_nip(request).await)
}

/// POST /download-isw-reports
pub async fn handle_download_isw(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let request = match query.isw_request() {
        Ok(request) => request,
        Err(e) => return bad_request(&e),
    };
    info!(
        "📥 ISW download requested for {} → {} ({:?})",
        request.start_date, request.end_date, request.report_type
    );
    match state.service.download_isw(request).await {
        Ok(result) => run_response(result),
        Err(e @ ReportError::MissingReportType) => {
            json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response()
        }
    }
}

/// GET /health
pub async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /report-types
pub async fn handle_report_types() -> impl IntoResponse {
    let entries: Vec<ReportTypeEntry> = ReportType::ALL
        .iter()
        .map(|r| ReportTypeEntry {
            code: r.code(),
            name: r.label(),
        })
        .collect();
    (StatusCode::OK, Json(entries))
}

/// Fallback for unmatched routes
pub async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}
