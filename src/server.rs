//! HTTP surface
//!
//! Endpoints:
//! - POST /download-nip-report   - run the NIP flow for a date range
//! - POST /download-isw-reports  - run the ISW flow for a date range and report type
//! - GET  /report-types          - the ISW report categories
//! - GET  /health                - liveness
//!
//! Input errors answer 400 `{detail}`; a failed run answers 500
//! `{detail, messages, files_downloaded}` on both download endpoints.

pub mod handlers;
pub mod request;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::application::ReportService;
use crate::infrastructure::{AppConfig, BrowserLauncher};

use self::handlers::{
    handle_download_isw, handle_download_nip, handle_health, handle_not_found,
    handle_report_types,
};
pub use self::state::AppState;

/// JSON error body in the shape the download endpoints use
pub(crate) fn json_error(status: StatusCode, detail: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "detail": detail })))
}

/// Router with every route, permissive CORS and request tracing
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/download-nip-report", post(handle_download_nip))
        .route("/download-isw-reports", post(handle_download_isw))
        .route("/report-types", get(handle_report_types))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn serve<F>(
    config: AppConfig,
    launcher: Arc<dyn BrowserLauncher>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.server.bind_addr;
    let service = ReportService::new(Arc::new(config), launcher);
    let app = build_router(Arc::new(AppState::new(service)));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("🌐 Report downloader listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    info!("Server shut down");
    Ok(())
}
