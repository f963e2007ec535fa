//! Shared session runtime
//!
//! A portal session drives one [`PortalPage`] through its state machine and
//! records everything it does in a [`RunContext`]. The context outlives the
//! session so partial progress survives a failure.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{MessageLog, Portal, RunRequest, SavedFile, SessionState, StateTrail};
use crate::infrastructure::{BrowserError, PortalPage, RunSink, SinkError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Step '{step}' did not finish within {limit:?}")]
    StepTimeout { step: &'static str, limit: Duration },
}

impl SessionError {
    pub fn is_timeout(&self) -> bool {
        match self {
            SessionError::Browser(e) => e.is_timeout(),
            SessionError::StepTimeout { .. } => true,
            SessionError::Sink(_) => false,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Run `fut` under a deadline covering the whole step
pub async fn within<T, F>(step: &'static str, limit: Duration, fut: F) -> SessionResult<T>
where
    F: Future<Output = SessionResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SessionError::StepTimeout { step, limit })?
}

/// How a session ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Pagination finished; status follows the number of saved files
    Completed,
    /// The search returned nothing
    NoResults { attempts: u32, exhausted: bool },
    /// The portal layout was not what the flow expects; nothing was downloaded
    Aborted { reason: String },
}

/// Mutable state of a run shared between the session and the service
#[derive(Debug)]
pub struct RunContext {
    pub log: MessageLog,
    pub trail: StateTrail,
    pub sink: RunSink,
    pub saved: Vec<SavedFile>,
}

impl RunContext {
    pub fn new(portal: Portal, sink: RunSink) -> Self {
        Self {
            log: MessageLog::new(portal),
            trail: StateTrail::default(),
            sink,
            saved: Vec::new(),
        }
    }

    pub fn portal(&self) -> Portal {
        self.log.portal()
    }

    pub fn total_saved(&self) -> usize {
        self.saved.len()
    }

    pub fn advance(&mut self, next: SessionState) {
        self.trail.advance(next);
    }

    /// Closing line of a run that walked the whole table
    pub fn log_finished(&mut self) {
        let total = self.total_saved();
        self.log.info(format!("Finished – {total} files downloaded."));
    }
}

/// One portal's login-to-download flow
#[async_trait]
pub trait PortalSession: Send + Sync {
    fn portal(&self) -> Portal;

    async fn drive(
        &self,
        page: &mut dyn PortalPage,
        ctx: &mut RunContext,
        request: &RunRequest,
    ) -> SessionResult<SessionOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_passes_through_result() {
        let value = tokio_test::block_on(within("quick", Duration::from_secs(1), async { Ok(7) }));
        assert_eq!(tokio_test::assert_ok!(value), 7);
    }

    #[tokio::test]
    async fn test_within_reports_step_timeout() {
        let result: SessionResult<()> = within("slow", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("slow"));
    }

    #[test]
    fn test_sink_errors_are_not_timeouts() {
        let err = SessionError::Sink(SinkError::Directory {
            path: "/nope".into(),
            source: std::io::Error::other("denied"),
        });
        assert!(!err.is_timeout());
    }
}
