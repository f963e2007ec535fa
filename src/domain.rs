//! Domain module - report runs, report categories and run-scoped state
//!
//! Everything in here is transient: created for one run and dropped with it.

pub mod message_log;
pub mod report_type;
pub mod run;
pub mod session_state;

// Re-export commonly used items for convenience
pub use message_log::{LogEntry, LogLevel, MessageLog};
pub use report_type::{ReattemptOption, ReportType, UnknownReportType};
pub use run::{Portal, RunRequest, RunResult, RunStatus, SavedFile};
pub use session_state::{SessionState, StateTrail};
