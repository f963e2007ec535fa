//! NIP flow against the scripted portal
mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use report_downloader_lib::application::ReportService;
use report_downloader_lib::domain::{RunRequest, RunStatus};

use common::{MockLauncher, PortalScript, saved_line, test_config};

fn january() -> RunRequest {
    RunRequest::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    )
    .headless(true)
}

fn service(launcher: &MockLauncher, dir: &std::path::Path) -> ReportService {
    ReportService::new(Arc::new(test_config(dir)), Arc::new(launcher.clone()))
}

#[tokio::test]
async fn two_pages_all_succeeding_saves_every_file_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(PortalScript::with_pages(&[3, 2]));

    let result = service(&launcher, dir.path()).download_nip(january()).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.total_saved, 5);
    assert_eq!(
        result.messages,
        vec![
            "Navigating to login …".to_string(),
            "📅  From: 01/01/2024".to_string(),
            "📅  To:   31/01/2024".to_string(),
            "Reload triggered".to_string(),
            "Table ready – starting downloads".to_string(),
            "Found 3 download buttons on page 1".to_string(),
            saved_line(1, "report_p1_1.csv"),
            saved_line(2, "report_p1_2.csv"),
            saved_line(3, "report_p1_3.csv"),
            "➡️  Page 2".to_string(),
            "Found 2 download buttons on page 2".to_string(),
            saved_line(4, "report_p2_1.csv"),
            saved_line(5, "report_p2_2.csv"),
            "Finished – 5 files downloaded.".to_string(),
        ]
    );

    for file in &result.saved_files {
        assert!(file.path.starts_with(dir.path()));
        assert!(file.path.exists(), "{:?} missing", file.path);
    }

    let record = launcher.record.lock().unwrap();
    assert_eq!(record.headless, Some(true));
    assert_eq!(record.visited, vec!["https://nip.example.com/main.jspx"]);
    assert!(record.filled.contains(&("#email".to_string(), "nip-user".to_string())));
    assert!(
        record
            .filled
            .contains(&("input[name='daterangepicker_start']".to_string(), "01/01/2024".to_string()))
    );
    assert!(record.scripts.iter().any(|s| s.contains("transactionReportTable.reload")));
    assert!(record.closed);
}

#[tokio::test]
async fn failed_element_is_logged_once_and_the_rest_still_download() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(PortalScript::with_pages(&[3, 2]).failing_at(0, 1));

    let result = service(&launcher, dir.path()).download_nip(january()).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.total_saved, 4);
    assert_eq!(launcher.record.lock().unwrap().download_attempts, 5);

    let failures: Vec<&String> = result
        .messages
        .iter()
        .filter(|m| m.contains("Download failed"))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("⚠️  Download failed for link 2 — "));

    // the element after the failure keeps the running count going
    let failure_at = result
        .messages
        .iter()
        .position(|m| m.contains("Download failed"))
        .unwrap();
    assert_eq!(result.messages[failure_at + 1], saved_line(2, "report_p1_3.csv"));
}

#[tokio::test]
async fn pagination_stops_when_no_next_control_remains() {
    let dir = tempfile::tempdir().unwrap();
    let pages = [2, 4, 1];
    let launcher = MockLauncher::new(PortalScript::with_pages(&pages));

    let result = service(&launcher, dir.path()).download_nip(january()).await;

    assert_eq!(result.total_saved, pages.iter().sum::<usize>());
    assert_eq!(launcher.next_clicks(), pages.len() - 1);
    let page_summaries = result
        .messages
        .iter()
        .filter(|m| m.starts_with("Found "))
        .count();
    assert_eq!(page_summaries, pages.len());
}

#[tokio::test]
async fn slow_page_switch_is_awaited_before_counting_the_next_page() {
    let dir = tempfile::tempdir().unwrap();
    let script =
        PortalScript::with_pages(&[3, 2]).switching_after(std::time::Duration::from_millis(200));
    let launcher = MockLauncher::new(script);

    let result = service(&launcher, dir.path()).download_nip(january()).await;

    assert_eq!(result.status, RunStatus::Success);
    let names: Vec<&str> = result
        .saved_files
        .iter()
        .map(|f| f.final_name.as_str())
        .collect();
    assert_eq!(
        names,
        [
            "report_p1_1.csv",
            "report_p1_2.csv",
            "report_p1_3.csv",
            "report_p2_1.csv",
            "report_p2_2.csv",
        ]
    );
    assert!(
        result
            .messages
            .contains(&"Found 2 download buttons on page 2".to_string())
    );
}

#[tokio::test]
async fn empty_page_after_the_first_warns_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(PortalScript::with_pages(&[2, 0]));

    let result = service(&launcher, dir.path()).download_nip(january()).await;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.total_saved, 2);
    assert!(
        result
            .messages
            .contains(&"⚠️  no download buttons found on this page".to_string())
    );
    assert_eq!(result.messages.last().unwrap(), "Finished – 2 files downloaded.");
}

#[tokio::test]
async fn every_download_failing_yields_warning_status() {
    let dir = tempfile::tempdir().unwrap();
    let launcher =
        MockLauncher::new(PortalScript::with_pages(&[2]).failing_at(0, 0).failing_at(0, 1));

    let result = service(&launcher, dir.path()).download_nip(january()).await;

    assert_eq!(result.status, RunStatus::Warning);
    assert_eq!(result.total_saved, 0);
    assert!(launcher.closed());
}

#[tokio::test]
async fn table_that_never_loads_fails_the_run_and_still_closes_the_browser() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(PortalScript::with_pages(&[]));

    let result = service(&launcher, dir.path()).download_nip(january()).await;

    assert_eq!(result.status, RunStatus::Failure);
    assert_eq!(result.total_saved, 0);
    let last = result.messages.last().unwrap();
    assert!(last.starts_with("Error during download: "), "{last}");
    assert!(result.failure.as_deref().unwrap().contains("Timed out"));
    assert!(launcher.closed());
}

#[tokio::test]
async fn missing_date_filter_fails_before_any_download() {
    let dir = tempfile::tempdir().unwrap();
    let launcher =
        MockLauncher::new(PortalScript::with_pages(&[3]).without("#settlementDateFilter"));

    let result = service(&launcher, dir.path()).download_nip(january()).await;

    assert!(result.is_failure());
    assert_eq!(launcher.record.lock().unwrap().download_attempts, 0);
    assert!(result.failure.unwrap().contains("#settlementDateFilter"));
    assert!(launcher.closed());
}

#[tokio::test]
async fn launch_failure_is_reported_as_a_failed_run() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(PortalScript {
        launch_fails: true,
        ..PortalScript::with_pages(&[1])
    });

    let result = service(&launcher, dir.path()).download_nip(january()).await;

    assert!(result.is_failure());
    assert!(result.failure.unwrap().contains("no browser binary"));
}

#[tokio::test]
async fn over_long_names_are_shortened_and_collisions_kept_apart() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("d".repeat(100));
    let tail = "t".repeat(140);
    let mut script = PortalScript::with_pages(&[2]);
    script
        .file_names
        .insert((0, 0), format!("{}{tail}.csv", "A".repeat(24)));
    script
        .file_names
        .insert((0, 1), format!("{}{tail}.csv", "B".repeat(24)));
    let launcher = MockLauncher::new(script);

    let result = service(&launcher, &dir).download_nip(january()).await;

    assert_eq!(result.total_saved, 2);
    let names: Vec<&str> = result
        .saved_files
        .iter()
        .map(|f| f.final_name.as_str())
        .collect();
    assert_eq!(names, vec![format!("{tail}.csv"), format!("{tail} (1).csv")]);
    assert!(result.saved_files.iter().all(|f| f.was_renamed()));
}
