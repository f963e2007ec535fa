//! Query-string parsing for the download endpoints

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{ReportType, RunRequest, UnknownReportType};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("Missing required query parameter '{0}'")]
    Missing(&'static str),

    #[error("Invalid {field} '{value}': expected format YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },

    #[error("Invalid headless flag '{0}': expected true or false")]
    InvalidBool(String),

    #[error("Invalid attempt '{0}': expected a non-negative integer")]
    InvalidAttempt(String),

    #[error(transparent)]
    UnknownReportType(#[from] UnknownReportType),
}

/// Raw query parameters; every field is validated by hand so the
/// caller gets one consistent error shape
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub report_type: Option<String>,
    pub headless: Option<String>,
    pub attempt: Option<String>,
}

fn parse_date(field: &'static str, value: Option<&str>) -> Result<NaiveDate, RequestError> {
    let value = value.map(str::trim).ok_or(RequestError::Missing(field))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| RequestError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

/// Boolean query flag, accepting the spellings form frameworks usually do
pub fn parse_flag(value: Option<&str>) -> Result<bool, RequestError> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" | "off" => Ok(false),
        "true" | "1" | "yes" | "on" => Ok(true),
        _ => Err(RequestError::InvalidBool(raw.to_string())),
    }
}

impl DownloadQuery {
    fn base_request(&self) -> Result<RunRequest, RequestError> {
        let start = parse_date("start_date", self.start_date.as_deref())?;
        let end = parse_date("end_date", self.end_date.as_deref())?;
        let headless = parse_flag(self.headless.as_deref())?;
        Ok(RunRequest::new(start, end).headless(headless))
    }

    pub fn nip_request(&self) -> Result<RunRequest, RequestError> {
        self.base_request()
    }

    pub fn isw_request(&self) -> Result<RunRequest, RequestError> {
        let report_type: ReportType = self
            .report_type
            .as_deref()
            .ok_or(RequestError::Missing("report_type"))?
            .parse()?;

        let attempts = match self.attempt.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| RequestError::InvalidAttempt(raw.to_string()))?,
        };

        Ok(self
            .base_request()?
            .with_report_type(report_type)
            .with_previous_attempts(attempts))
    }
}
