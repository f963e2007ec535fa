//! Browser driver abstraction
//!
//! The portal flows only talk to a [`PortalPage`]: a single page with an
//! authenticated browser context behind it. Elements are addressed with a
//! [`Locator`] (scope + CSS + optional text filter) and every wait is a
//! condition bounded by an explicit timeout.

pub mod chromium;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::debug;

pub use chromium::ChromiumLauncher;

/// Interval between condition checks while waiting on the page
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("No element matches {locator} (index {index})")]
    ElementNotFound { locator: String, index: usize },

    #[error("Frame '{0}' not found")]
    FrameNotFound(String),

    #[error("Download was cancelled: {0}")]
    DownloadCancelled(String),

    #[error("Browser session closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    pub fn timeout(what: impl fmt::Display, timeout: Duration) -> Self {
        Self::Timeout {
            what: what.to_string(),
            timeout,
        }
    }

    /// Slowness rather than a structural problem with the page
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// Document an element query runs against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Page,
    /// Named frame of a frameset page
    Frame(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Page => f.write_str("page"),
            Scope::Frame(name) => write!(f, "frame '{name}'"),
        }
    }
}

/// CSS selector, optionally narrowed to elements whose text contains `text`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    scope: Scope,
    css: String,
    text: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            scope: Scope::Page,
            css: css.into(),
            text: None,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn in_frame(mut self, name: impl Into<String>) -> Self {
        self.scope = Scope::Frame(name.into());
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn css_selector(&self) -> &str {
        &self.css
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "'{}' containing '{}' in {}", self.css, text, self.scope),
            None => write!(f, "'{}' in {}", self.css, self.scope),
        }
    }
}

/// Condition a wait is satisfied by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Present in the DOM
    Attached,
    /// Present and rendered with a non-empty box
    Visible,
}

/// A finished download sitting in the staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDownload {
    pub suggested_filename: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Where the browser writes downloads before they are moved into the sink
    pub staging_dir: PathBuf,
    /// Per-command protocol timeout
    pub request_timeout: Duration,
}

/// One page of an authenticated browser context
#[async_trait]
pub trait PortalPage: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> BrowserResult<()>;

    /// Poll until at least one element matching `locator` satisfies `state`
    async fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> BrowserResult<()>;

    /// Wait for the `index`-th match instead of the first
    async fn wait_for_nth(
        &mut self,
        locator: &Locator,
        index: usize,
        state: WaitState,
        timeout: Duration,
    ) -> BrowserResult<()>;

    async fn count(&mut self, locator: &Locator) -> BrowserResult<usize>;

    /// Text of the `index`-th match; `None` when there is no such element
    async fn text_content(
        &mut self,
        locator: &Locator,
        index: usize,
    ) -> BrowserResult<Option<String>>;

    /// Poll until the first match's text differs from `previous` or the match detaches
    async fn wait_for_change(
        &mut self,
        locator: &Locator,
        previous: Option<&str>,
        timeout: Duration,
    ) -> BrowserResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.text_content(locator, 0).await {
                Ok(current) if current.as_deref() != previous => return Ok(()),
                Ok(_) => {}
                // A frame being replaced answers with an error until its new document loads
                Err(e) => debug!("Change of {} not observable yet: {}", locator, e),
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::timeout(format!("{locator} to change"), timeout));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Set an input's value and fire `input`/`change`
    async fn fill(&mut self, locator: &Locator, value: &str) -> BrowserResult<()>;

    async fn click(&mut self, locator: &Locator, index: usize) -> BrowserResult<()>;

    async fn select_option(&mut self, locator: &Locator, value: &str) -> BrowserResult<()>;

    async fn scroll_into_view(&mut self, locator: &Locator, index: usize) -> BrowserResult<()>;

    /// Run a script for its side effects in `scope`
    async fn evaluate(&mut self, scope: &Scope, script: &str) -> BrowserResult<()>;

    async fn has_frame(&mut self, name: &str) -> BrowserResult<bool>;

    /// Click the `index`-th match and wait for the download it triggers
    async fn click_for_download(
        &mut self,
        locator: &Locator,
        index: usize,
        timeout: Duration,
    ) -> BrowserResult<PendingDownload>;

    /// Close the page, its context and the browser process
    async fn close(&mut self) -> BrowserResult<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: LaunchOptions) -> BrowserResult<Box<dyn PortalPage>>;
}
