//! Configuration infrastructure
//!
//! Configuration is assembled once at process start from (lowest precedence
//! first) built-in defaults, an optional `.env` file, an optional
//! `report-downloader.{toml,json}` file and the process environment.
//! Missing portal credentials are reported as a typed error instead of
//! aborting at module load.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::domain::Portal;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Missing {key}. Check your .env file or environment")]
    MissingCredential { key: &'static str },

    #[error("Invalid portal URL for {key}: {value} ({reason})")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid bind address '{value}': {reason}")]
    InvalidBindAddr { value: String, reason: String },

    #[error("Could not determine a download directory; set DOWNLOAD_DIR")]
    NoDownloadDir,
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub nip: PortalCredentials,
    pub isw: PortalCredentials,
    pub downloads: DownloadConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub timeouts: TimeoutConfig,
}

/// Login details for one portal
#[derive(Clone)]
pub struct PortalCredentials {
    pub portal: Portal,
    pub username: String,
    pub password: String,
    pub portal_url: Url,
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("portal", &self.portal)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("portal_url", &self.portal_url.as_str())
            .finish()
    }
}

impl PortalCredentials {
    /// Portal URL joined with `path`, without doubling the slash
    pub fn url_with_path(&self, path: &str) -> String {
        let base = self.portal_url.as_str().trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path.trim_start_matches('/'))
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory every saved report lands in
    pub directory: PathBuf,
}

/// Logging configuration settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Directory holding the per-portal log files
    pub directory: PathBuf,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            directory: default_log_directory(),
            console_output: true,
            file_output: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Clone, Default)]
pub struct BrowserConfig {
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,
}

/// Deadlines for every wait in the portal flows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Page navigation and login form
    pub navigation: Duration,
    /// Menu links, filter inputs and selects
    pub element: Duration,
    /// Whole login step
    pub login_step: Duration,
    /// Whole menu navigation step
    pub menu_step: Duration,
    /// Whole date/report filter step
    pub filter_step: Duration,
    /// First download element after applying the filter (NIP)
    pub nip_table_ready: Duration,
    /// First download element on each result page (ISW)
    pub isw_table_ready: Duration,
    /// Search results appearing after the search button (ISW)
    pub isw_results: Duration,
    /// Single download (NIP)
    pub nip_download: Duration,
    /// Single download (ISW)
    pub isw_download: Duration,
    /// Table rows after switching pages
    pub row_refresh: Duration,
    /// A download element becoming visible before it is clicked
    pub link_visible: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(defaults::NAVIGATION_TIMEOUT_SECS),
            element: Duration::from_secs(defaults::ELEMENT_TIMEOUT_SECS),
            login_step: Duration::from_secs(defaults::LOGIN_STEP_SECS),
            menu_step: Duration::from_secs(defaults::MENU_STEP_SECS),
            filter_step: Duration::from_secs(defaults::FILTER_STEP_SECS),
            nip_table_ready: Duration::from_secs(defaults::NIP_TABLE_READY_SECS),
            isw_table_ready: Duration::from_secs(defaults::ISW_TABLE_READY_SECS),
            isw_results: Duration::from_secs(defaults::ISW_RESULTS_SECS),
            nip_download: Duration::from_secs(defaults::NIP_DOWNLOAD_SECS),
            isw_download: Duration::from_secs(defaults::ISW_DOWNLOAD_SECS),
            row_refresh: Duration::from_secs(defaults::ROW_REFRESH_SECS),
            link_visible: Duration::from_secs(defaults::LINK_VISIBLE_SECS),
        }
    }
}

/// Flat view of every recognised key, as delivered by the `config` crate
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    nip_user: Option<String>,
    nip_pw: Option<String>,
    nip_portal_url: Option<String>,
    isw_user: Option<String>,
    isw_pw: Option<String>,
    isw_portal_url: Option<String>,
    download_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    log_level: Option<String>,
    bind_addr: Option<String>,
    chrome_executable: Option<PathBuf>,
}

impl AppConfig {
    /// Load from `.env`, an optional config file and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::new(".env", config::FileFormat::Ini).required(false))
            .add_source(config::File::with_name(defaults::CONFIG_FILE_STEM).required(false))
            .add_source(config::Environment::default().try_parsing(false))
            .build()?;

        let raw: RawSettings = settings.try_deserialize()?;
        let config = Self::from_raw(raw)?;
        info!("Loaded configuration (downloads: {:?})", config.downloads.directory);
        Ok(config)
    }

    /// Build from an explicit key/value map; keys use the environment names
    pub fn from_source(values: HashMap<String, String>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .try_parsing(false)
                    .source(Some(values)),
            )
            .build()?;

        Self::from_raw(settings.try_deserialize()?)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let nip = PortalCredentials {
            portal: Portal::Nip,
            username: required(raw.nip_user, "NIP_USER")?,
            password: required(raw.nip_pw, "NIP_PW")?,
            portal_url: portal_url(raw.nip_portal_url, "NIP_PORTAL_URL")?,
        };
        let isw = PortalCredentials {
            portal: Portal::Isw,
            username: required(raw.isw_user, "ISW_USER")?,
            password: required(raw.isw_pw, "ISW_PW")?,
            portal_url: portal_url(raw.isw_portal_url, "ISW_PORTAL_URL")?,
        };

        let directory = match raw.download_dir.filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir,
            None => default_download_directory().ok_or(ConfigError::NoDownloadDir)?,
        };

        let mut logging = LoggingConfig::default();
        if let Some(level) = raw.log_level.filter(|l| !l.trim().is_empty()) {
            logging.level = level.trim().to_lowercase();
        }
        if let Some(dir) = raw.log_dir.filter(|p| !p.as_os_str().is_empty()) {
            logging.directory = dir;
        }

        let bind_value = raw
            .bind_addr
            .map(|v| clean_value(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::BIND_ADDR.to_string());
        let bind_addr = bind_value
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidBindAddr {
                value: bind_value.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            nip,
            isw,
            downloads: DownloadConfig { directory },
            logging,
            server: ServerConfig { bind_addr },
            browser: BrowserConfig {
                executable: raw.chrome_executable.filter(|p| !p.as_os_str().is_empty()),
            },
            timeouts: TimeoutConfig::default(),
        })
    }
}

/// Strip whitespace and one layer of surrounding quotes
fn clean_value(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string()
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| clean_value(&v))
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingCredential { key })
}

fn portal_url(value: Option<String>, key: &'static str) -> Result<Url, ConfigError> {
    let value = required(value, key)?;
    Url::parse(&value).map_err(|e| ConfigError::InvalidUrl {
        key,
        value,
        reason: e.to_string(),
    })
}

/// The user's downloads folder, falling back to `~/Downloads`
pub fn default_download_directory() -> Option<PathBuf> {
    dirs::download_dir().or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
}

/// `logs` next to the executable, or under the working directory
pub fn default_log_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
        .join("logs")
}

/// Default configuration values
pub mod defaults {
    /// Config file looked up in the working directory (any supported extension)
    pub const CONFIG_FILE_STEM: &str = "report-downloader";

    /// Default listen address of the HTTP server
    pub const BIND_ADDR: &str = "0.0.0.0:8000";

    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Page navigation / login form timeout
    pub const NAVIGATION_TIMEOUT_SECS: u64 = 90;

    /// Menu, filter and select element timeout
    pub const ELEMENT_TIMEOUT_SECS: u64 = 10;

    pub const LOGIN_STEP_SECS: u64 = 180;
    pub const MENU_STEP_SECS: u64 = 60;
    pub const FILTER_STEP_SECS: u64 = 60;

    pub const NIP_TABLE_READY_SECS: u64 = 15;
    pub const ISW_TABLE_READY_SECS: u64 = 60;
    pub const ISW_RESULTS_SECS: u64 = 10;

    pub const NIP_DOWNLOAD_SECS: u64 = 60;
    pub const ISW_DOWNLOAD_SECS: u64 = 120;

    pub const ROW_REFRESH_SECS: u64 = 10;
    pub const LINK_VISIBLE_SECS: u64 = 5;

    /// Number of consecutive no-result searches tolerated on ISW
    pub const ISW_MAX_ATTEMPTS: u32 = 5;

    /// ISW refuses reports older than this many days
    pub const ISW_MAX_REPORT_AGE_DAYS: i64 = 90;
}
