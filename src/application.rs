//! Application layer
//!
//! Portal state machines and the service that runs them against a browser.

pub mod download_loop;
pub mod isw_session;
pub mod nip_session;
pub mod report_service;
pub mod session;

pub use download_loop::{PageDownloader, PortalLayout};
pub use isw_session::IswSession;
pub use nip_session::NipSession;
pub use report_service::{ReportError, ReportService, failure_detail};
pub use session::{PortalSession, RunContext, SessionError, SessionOutcome, SessionResult, within};
