//! ISW flow against the scripted portal
mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use report_downloader_lib::application::isw_session::{
    ATTEMPTS_EXCEEDED, MISSING_MENU_FRAME, NO_REPORTS, RETRY_PROMPT, TOO_OLD,
};
use report_downloader_lib::application::{IswSession, ReportError, ReportService};
use report_downloader_lib::domain::{ReattemptOption, ReportType, RunRequest, RunStatus};
use report_downloader_lib::infrastructure::AppConfig;

use common::{MockLauncher, PortalScript, saved_line, test_config};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn request() -> RunRequest {
    RunRequest::new(date(2024, 6, 1), date(2024, 6, 10))
        .headless(true)
        .with_report_type(ReportType::AtmDetail)
}

struct Harness {
    _dir: tempfile::TempDir,
    config: Arc<AppConfig>,
    launcher: MockLauncher,
    service: ReportService,
}

impl Harness {
    fn new(script: PortalScript) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(dir.path()));
        let launcher = MockLauncher::new(script);
        let service = ReportService::new(Arc::clone(&config), Arc::new(launcher.clone()));
        Self {
            _dir: dir,
            config,
            launcher,
            service,
        }
    }

    /// Session pinned to a date inside the 90-day window of `request()`
    fn session(&self) -> IswSession {
        IswSession::new(self.config.isw.clone(), self.config.timeouts.clone())
            .with_today(date(2024, 6, 20))
    }
}

#[tokio::test]
async fn downloads_every_page_from_the_body_frame() {
    let h = Harness::new(PortalScript::with_pages(&[2, 1]));

    let result = h.service.run(&h.session(), request()).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.total_saved, 3);
    assert_eq!(result.report_type, Some(ReportType::AtmDetail));
    assert_eq!(
        result.messages,
        vec![
            "Navigating to login …".to_string(),
            "Calendar dates filled and applied".to_string(),
            "Report type set to: 24".to_string(),
            "Search triggered by button click".to_string(),
            "Table reloaded – starting downloads".to_string(),
            "Page 1 – 2 download links found".to_string(),
            saved_line(1, "report_p1_1.csv"),
            saved_line(2, "report_p1_2.csv"),
            "Page 2 – 1 download links found".to_string(),
            saved_line(3, "report_p2_1.csv"),
            "Finished – 3 files downloaded.".to_string(),
        ]
    );

    let record = h.launcher.record.lock().unwrap();
    assert_eq!(record.visited, vec!["https://isw.example.com/login"]);
    assert_eq!(
        record.selected,
        vec![("select#reportTypeId".to_string(), "24".to_string())]
    );
    assert!(record.filled.contains(&("input[name='dateStart']".to_string(), "01/06/2024".to_string())));
    assert!(record.filled.contains(&("input[name='dateEnd']".to_string(), "10/06/2024".to_string())));
    assert!(record.closed);
}

#[tokio::test]
async fn missing_menu_frame_aborts_without_downloading() {
    let h = Harness::new(PortalScript::with_pages(&[3]).without_frame("menu"));

    let result = h.service.run(&h.session(), request()).await;

    assert_eq!(result.status, RunStatus::Failure);
    assert_eq!(result.total_saved, 0);
    assert_eq!(result.messages.last().map(String::as_str), Some(MISSING_MENU_FRAME));
    assert_eq!(result.failure.as_deref(), Some(MISSING_MENU_FRAME));
    assert_eq!(h.launcher.record.lock().unwrap().download_attempts, 0);
    assert!(h.launcher.closed());
}

#[tokio::test]
async fn empty_search_prompts_for_another_attempt() {
    let h = Harness::new(PortalScript::with_pages(&[]));

    let result = h.service.run(&h.session(), request()).await;

    assert_eq!(result.status, RunStatus::NoReportAvailable);
    assert_eq!(result.attempts, Some(1));
    assert_eq!(result.prompt.as_deref(), Some(RETRY_PROMPT));
    assert_eq!(result.reattempt_options, ReattemptOption::ALL.to_vec());
    assert_eq!(result.messages.last().map(String::as_str), Some(NO_REPORTS));
    assert!(h.launcher.closed());
}

#[tokio::test]
async fn fifth_empty_search_exhausts_the_budget() {
    let h = Harness::new(PortalScript::with_pages(&[]));

    let result = h
        .service
        .run(&h.session(), request().with_previous_attempts(4))
        .await;

    assert_eq!(result.status, RunStatus::NoReportAvailable);
    assert_eq!(result.attempts, Some(5));
    assert!(result.prompt.is_none());
    assert!(result.reattempt_options.is_empty());
    assert!(result.messages.contains(&NO_REPORTS.to_string()));
    assert_eq!(result.messages.last().map(String::as_str), Some(ATTEMPTS_EXCEEDED));
}

#[tokio::test]
async fn old_start_date_is_reported_but_the_run_continues() {
    let h = Harness::new(PortalScript::with_pages(&[1]));
    let old = RunRequest::new(date(2024, 1, 1), date(2024, 1, 5))
        .with_report_type(ReportType::Visa);

    let result = h.service.run(&h.session(), old).await;

    assert!(result.messages.contains(&TOO_OLD.to_string()));
    assert!(result.messages.contains(&"Report type set to: 31".to_string()));
    assert_eq!(result.total_saved, 1);
    assert_eq!(result.status, RunStatus::Success);
}

#[tokio::test]
async fn empty_later_page_warns_and_finishes() {
    let h = Harness::new(PortalScript::with_pages(&[2, 0]));

    let result = h.service.run(&h.session(), request()).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.total_saved, 2);
    assert!(
        result
            .messages
            .contains(&"⚠️  no download buttons found on this page".to_string())
    );
    assert_eq!(result.messages.last().unwrap(), "Finished – 2 files downloaded.");
    assert!(h.launcher.closed());
}

#[tokio::test]
async fn delayed_frame_reload_downloads_each_page_once() {
    let script =
        PortalScript::with_pages(&[2, 1]).switching_after(std::time::Duration::from_millis(200));
    let h = Harness::new(script);

    let result = h.service.run(&h.session(), request()).await;

    assert_eq!(result.status, RunStatus::Success);
    let names: Vec<&str> = result
        .saved_files
        .iter()
        .map(|f| f.final_name.as_str())
        .collect();
    assert_eq!(names, ["report_p1_1.csv", "report_p1_2.csv", "report_p2_1.csv"]);
}

#[tokio::test]
async fn failed_link_does_not_stop_the_page() {
    let h = Harness::new(PortalScript::with_pages(&[3]).failing_at(0, 0));

    let result = h.service.run(&h.session(), request()).await;

    assert_eq!(result.total_saved, 2);
    let warnings: Vec<&String> = result
        .messages
        .iter()
        .filter(|m| m.starts_with("⚠️  Download failed for link 1"))
        .collect();
    assert_eq!(warnings.len(), 1);
}

#[tokio::test]
async fn service_rejects_isw_run_without_report_type() {
    let h = Harness::new(PortalScript::with_pages(&[1]));
    let bare = RunRequest::new(date(2024, 6, 1), date(2024, 6, 2));

    let err = h.service.download_isw(bare).await.unwrap_err();

    assert_eq!(err, ReportError::MissingReportType);
    assert_eq!(h.launcher.record.lock().unwrap().launches, 0);
}
