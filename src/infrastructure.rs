//! Infrastructure layer for configuration, logging, the browser driver and
//! the download directory.

pub mod browser;
pub mod config;
pub mod download_sink;
pub mod logging;

// Re-export commonly used items
pub use browser::{
    BrowserError, BrowserLauncher, BrowserResult, ChromiumLauncher, LaunchOptions, Locator,
    PendingDownload, PortalPage, Scope, WaitState,
};
pub use config::{AppConfig, ConfigError, PortalCredentials, TimeoutConfig};
pub use download_sink::{DownloadSink, RunSink, SaveOutcome, SinkError};
pub use logging::{LogGuards, init_logging, log_system_info};
