//! Run-scoped message log
//!
//! Every status line produced during a run is appended here and mirrored to the
//! portal's tracing target, so the same text ends up both in the HTTP response
//! and in the portal log file.

use serde::Serialize;
use tracing::{error, info, warn};

use super::run::Portal;

/// Severity of a message log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub text: String,
}

/// Append-only sequence of entries for a single run
#[derive(Debug, Clone)]
pub struct MessageLog {
    portal: Portal,
    entries: Vec<LogEntry>,
}

impl MessageLog {
    pub fn new(portal: Portal) -> Self {
        Self {
            portal,
            entries: Vec::new(),
        }
    }

    pub fn portal(&self) -> Portal {
        self.portal
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Info, text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Warning, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Error, text);
    }

    pub fn push(&mut self, level: LogLevel, text: impl Into<String>) {
        let text = text.into();
        // tracing targets must be static, hence the fan-out per portal
        match (self.portal, level) {
            (Portal::Nip, LogLevel::Info) => info!(target: "portal::nip", "{}", text),
            (Portal::Nip, LogLevel::Warning) => warn!(target: "portal::nip", "{}", text),
            (Portal::Nip, LogLevel::Error) => error!(target: "portal::nip", "{}", text),
            (Portal::Isw, LogLevel::Info) => info!(target: "portal::isw", "{}", text),
            (Portal::Isw, LogLevel::Warning) => warn!(target: "portal::isw", "{}", text),
            (Portal::Isw, LogLevel::Error) => error!(target: "portal::isw", "{}", text),
        }
        self.entries.push(LogEntry { level, text });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn count_at(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    /// Plain message texts in insertion order
    pub fn into_messages(self) -> Vec<String> {
        self.entries.into_iter().map(|e| e.text).collect()
    }
}
