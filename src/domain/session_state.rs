//! Portal session states
//!
//! Both portals walk the same sequence of pages. The ISW variant adds a frame
//! lookup and a report-type selection, which fold into the existing states.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "page", rename_all = "snake_case")]
pub enum SessionState {
    Init,
    LoggedIn,
    ReportMenuOpen,
    DateRangeSet,
    TableLoaded,
    Paginating(u32),
    Done,
    Failed,
}

impl SessionState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::{
            DateRangeSet, Done, Failed, Init, LoggedIn, Paginating, ReportMenuOpen, TableLoaded,
        };

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            (Init, LoggedIn)
            | (LoggedIn, ReportMenuOpen)
            | (ReportMenuOpen, DateRangeSet)
            | (DateRangeSet, TableLoaded)
            | (TableLoaded, Paginating(1)) => true,
            // empty result set ends the run before any page is walked
            (DateRangeSet, Done) | (Paginating(_), Done) => true,
            (Paginating(n), Paginating(m)) => m == n + 1,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Init => f.write_str("init"),
            SessionState::LoggedIn => f.write_str("logged in"),
            SessionState::ReportMenuOpen => f.write_str("report menu open"),
            SessionState::DateRangeSet => f.write_str("date range set"),
            SessionState::TableLoaded => f.write_str("table loaded"),
            SessionState::Paginating(page) => write!(f, "paginating page {page}"),
            SessionState::Done => f.write_str("done"),
            SessionState::Failed => f.write_str("failed"),
        }
    }
}

/// Ordered record of the states a session went through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTrail {
    states: Vec<SessionState>,
}

impl Default for StateTrail {
    fn default() -> Self {
        Self {
            states: vec![SessionState::Init],
        }
    }
}

impl StateTrail {
    pub fn current(&self) -> SessionState {
        self.states.last().copied().unwrap_or(SessionState::Init)
    }

    /// Record a transition; returns false (and records nothing) when illegal
    pub fn advance(&mut self, next: SessionState) -> bool {
        let current = self.current();
        if !current.can_transition_to(next) {
            tracing::warn!("Ignoring illegal session transition {} -> {}", current, next);
            return false;
        }
        tracing::debug!("Session transition {} -> {}", current, next);
        self.states.push(next);
        true
    }

    pub fn states(&self) -> &[SessionState] {
        &self.states
    }

    /// Number of `Paginating` states entered
    pub fn pages_visited(&self) -> usize {
        self.states
            .iter()
            .filter(|s| matches!(s, SessionState::Paginating(_)))
            .count()
    }
}
