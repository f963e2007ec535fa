//! Logging system configuration and initialization
//!
//! This module provides the logging setup with:
//! - Console output with local-time timestamps
//! - One append-only log file per portal (`nip.log`, `isw.log`)
//! - A `server.log` for everything that is not portal traffic
//! - `RUST_LOG` override on top of the configured level

use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::Local;
use tracing::{Metadata, info};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::filter_fn,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

/// Target prefix shared by both portal log streams
pub const PORTAL_TARGET_PREFIX: &str = "portal::";

/// Log file per tracing target prefix
const LOG_FILES: [(&str, &str); 2] = [("portal::nip", "nip.log"), ("portal::isw", "isw.log")];
const SERVER_LOG_FILE: &str = "server.log";

/// Keeps the non-blocking file writers alive; drop it to flush on shutdown
#[must_use = "dropping the guards stops file logging"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Local time formatter used by every layer
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

fn file_writer(dir: &Path, file_name: &str, guards: &mut Vec<WorkerGuard>) -> NonBlocking {
    // rolling::never appends to an existing file
    let (writer, guard) = non_blocking(rolling::never(dir, file_name));
    guards.push(guard);
    writer
}

fn is_portal_target(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with(PORTAL_TARGET_PREFIX)
}

/// Build the env filter: `RUST_LOG` wins, otherwise the configured level with
/// noisy dependencies held back unless tracing everything
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        for directive in [
            "chromiumoxide=warn",
            "tungstenite=warn",
            "hyper=warn",
            "tower_http=info",
        ] {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    Ok(filter)
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuards> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = build_env_filter(config)?;
    let mut guards = Vec::new();

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    });

    let (nip_layer, isw_layer, server_layer) = if config.file_output {
        std::fs::create_dir_all(&config.directory).map_err(|e| {
            anyhow!("Failed to create log directory {:?}: {}", config.directory, e)
        })?;

        let [(nip_target, nip_file), (isw_target, isw_file)] = LOG_FILES;

        // File layers with minimal formatting (time + level + message only)
        let nip = fmt::Layer::new()
            .with_writer(file_writer(&config.directory, nip_file, &mut guards))
            .with_timer(LocalTimeFormatter)
            .with_target(false)
            .with_ansi(false)
            .with_filter(filter_fn(move |m: &Metadata<'_>| m.target().starts_with(nip_target)));
        let isw = fmt::Layer::new()
            .with_writer(file_writer(&config.directory, isw_file, &mut guards))
            .with_timer(LocalTimeFormatter)
            .with_target(false)
            .with_ansi(false)
            .with_filter(filter_fn(move |m: &Metadata<'_>| m.target().starts_with(isw_target)));
        let server = fmt::Layer::new()
            .with_writer(file_writer(&config.directory, SERVER_LOG_FILE, &mut guards))
            .with_timer(LocalTimeFormatter)
            .with_target(true)
            .with_ansi(false)
            .with_filter(filter_fn(|m: &Metadata<'_>| !is_portal_target(m)));

        (Some(nip), Some(isw), Some(server))
    } else {
        (None, None, None)
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(nip_layer)
        .with(isw_layer)
        .with(server_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log directory: {:?}", config.directory);
    info!("Log level: {}", config.level);
    info!("Console output: {}", config.console_output);
    info!("File output: {}", config.file_output);

    Ok(LogGuards { _guards: guards })
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Report Downloader System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("============================================");
}
