//! Report download service
//!
//! Entry point for both portals: opens a run sink, launches a browser,
//! drives the portal session and turns whatever happened into a
//! [`RunResult`]. The browser is closed on every path out of a run.

use std::error::Error;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::{MessageLog, ReattemptOption, RunRequest, RunResult, RunStatus, SessionState};
use crate::infrastructure::{AppConfig, BrowserLauncher, DownloadSink, LaunchOptions};

use super::isw_session::{IswSession, RETRY_PROMPT};
use super::nip_session::NipSession;
use super::session::{PortalSession, RunContext, SessionError, SessionOutcome};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("report_type is required for ISW downloads")]
    MissingReportType,
}

pub struct ReportService {
    config: Arc<AppConfig>,
    launcher: Arc<dyn BrowserLauncher>,
    sink: DownloadSink,
}

impl ReportService {
    pub fn new(config: Arc<AppConfig>, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let sink = DownloadSink::new(config.downloads.directory.clone());
        Self {
            config,
            launcher,
            sink,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn download_nip(&self, request: RunRequest) -> RunResult {
        let session = NipSession::new(self.config.nip.clone(), self.config.timeouts.clone());
        self.run(&session, request).await
    }

    pub async fn download_isw(&self, request: RunRequest) -> Result<RunResult, ReportError> {
        if request.report_type.is_none() {
            return Err(ReportError::MissingReportType);
        }
        let session = IswSession::new(self.config.isw.clone(), self.config.timeouts.clone());
        Ok(self.run(&session, request).await)
    }

    /// Execute one session end to end; failures are folded into the result
    pub async fn run(&self, session: &dyn PortalSession, request: RunRequest) -> RunResult {
        let portal = session.portal();
        info!(
            "🚀 Starting {} run {} → {} (headless: {})",
            portal, request.start_date, request.end_date, request.headless
        );

        let sink = match self.sink.open_run().await {
            Ok(sink) => sink,
            Err(e) => {
                error!("❌ {} run could not open the download directory: {}", portal, e);
                let mut log = MessageLog::new(portal);
                let failure = failure_detail(&SessionError::from(e));
                log.error(format!("Error during download: {failure}"));
                return RunResult {
                    portal,
                    status: RunStatus::Failure,
                    start_date: request.start_date,
                    end_date: request.end_date,
                    report_type: request.report_type,
                    total_saved: 0,
                    saved_files: Vec::new(),
                    messages: log.into_messages(),
                    download_directory: self.sink.directory().to_path_buf(),
                    prompt: None,
                    reattempt_options: Vec::new(),
                    attempts: None,
                    failure: Some(failure),
                };
            }
        };

        let mut ctx = RunContext::new(portal, sink);
        let options = LaunchOptions {
            headless: request.headless,
            staging_dir: ctx.sink.staging_dir().to_path_buf(),
            request_timeout: self.config.timeouts.navigation,
        };

        let outcome = match self.launcher.launch(options).await {
            Ok(mut page) => {
                let outcome = session.drive(page.as_mut(), &mut ctx, &request).await;
                if let Err(e) = page.close().await {
                    warn!("Failed to close {} browser cleanly: {}", portal, e);
                }
                outcome
            }
            Err(e) => Err(SessionError::from(e)),
        };

        let result = finish(ctx, outcome, request);
        info!(
            "🏁 {} run finished: {} ({} files)",
            portal, result.status, result.total_saved
        );
        result
    }
}

/// Message plus cause chain of a run-ending error
pub fn failure_detail(err: &SessionError) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !detail.contains(&text) {
            detail.push_str("\nCaused by: ");
            detail.push_str(&text);
        }
        source = cause.source();
    }
    detail
}

fn finish(
    mut ctx: RunContext,
    outcome: Result<SessionOutcome, SessionError>,
    request: RunRequest,
) -> RunResult {
    let mut prompt = None;
    let mut reattempt_options = Vec::new();
    let mut attempts = None;
    let mut failure = None;

    let status = match outcome {
        Ok(SessionOutcome::Completed) => RunStatus::from_saved(ctx.total_saved()),
        Ok(SessionOutcome::NoResults {
            attempts: used,
            exhausted,
        }) => {
            attempts = Some(used);
            if !exhausted {
                prompt = Some(RETRY_PROMPT.to_string());
                reattempt_options = ReattemptOption::ALL.to_vec();
            }
            RunStatus::NoReportAvailable
        }
        Ok(SessionOutcome::Aborted { reason }) => {
            failure = Some(reason);
            RunStatus::Failure
        }
        Err(e) => {
            let detail = failure_detail(&e);
            ctx.log.error(format!("Error during download: {detail}"));
            ctx.advance(SessionState::Failed);
            failure = Some(detail);
            RunStatus::Failure
        }
    };

    debug!(
        "{} session ended in state {} after {} page(s)",
        ctx.portal(),
        ctx.trail.current(),
        ctx.trail.pages_visited()
    );
    let download_directory = ctx.sink.directory().to_path_buf();
    RunResult {
        portal: ctx.portal(),
        status,
        start_date: request.start_date,
        end_date: request.end_date,
        report_type: request.report_type,
        total_saved: ctx.saved.len(),
        saved_files: ctx.saved,
        messages: ctx.log.into_messages(),
        download_directory,
        prompt,
        reattempt_options,
        attempts,
        failure,
    }
}
