//! Run request and result types
//!
//! A run is one browser session against one portal. Nothing here outlives the
//! run; the result is built once and handed back to the caller.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;

use super::report_type::{ReattemptOption, ReportType};

/// Portal a run is executed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Portal {
    Nip,
    Isw,
}

impl Portal {
    pub const fn as_str(self) -> &'static str {
        match self {
            Portal::Nip => "NIP",
            Portal::Isw => "ISW",
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied parameters for a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// ISW only
    pub report_type: Option<ReportType>,
    pub headless: bool,
    /// Number of no-result outcomes the caller already saw for this filter (ISW only)
    pub previous_attempts: u32,
}

impl RunRequest {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            report_type: None,
            headless: false,
            previous_attempts: 0,
        }
    }

    #[must_use]
    pub fn with_report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = Some(report_type);
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn with_previous_attempts(mut self, attempts: u32) -> Self {
        self.previous_attempts = attempts;
        self
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "no report available")]
    NoReportAvailable,
    #[serde(rename = "failure")]
    Failure,
}

impl RunStatus {
    /// Status for a run that reached the end of the pagination loop
    pub const fn from_saved(total_saved: usize) -> Self {
        if total_saved > 0 {
            RunStatus::Success
        } else {
            RunStatus::Warning
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Warning => "warning",
            RunStatus::NoReportAvailable => "no report available",
            RunStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file written to the download directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedFile {
    pub suggested_name: String,
    pub final_name: String,
    pub path: PathBuf,
}

impl SavedFile {
    pub fn was_renamed(&self) -> bool {
        self.suggested_name != self.final_name
    }
}

/// Immutable summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub portal: Portal,
    pub status: RunStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub report_type: Option<ReportType>,
    pub total_saved: usize,
    pub saved_files: Vec<SavedFile>,
    pub messages: Vec<String>,
    pub download_directory: PathBuf,
    /// Present only on a no-result outcome that is still within the retry budget
    pub prompt: Option<String>,
    pub reattempt_options: Vec<ReattemptOption>,
    /// No-result attempts counted so far, including this run (ISW only)
    pub attempts: Option<u32>,
    /// Error chain of the failure that ended the run early
    pub failure: Option<String>,
}

impl RunResult {
    pub fn is_failure(&self) -> bool {
        self.status == RunStatus::Failure
    }
}
