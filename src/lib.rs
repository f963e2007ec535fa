//! Report Downloader - NIP/ISW transaction report retrieval service
//!
//! Drives a browser through the login, filter and paginated download flows of
//! the NIP and ISW portals and exposes each flow as an HTTP endpoint.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::infrastructure::{AppConfig, ChromiumLauncher, init_logging, log_system_info};

/// Load configuration, start logging and serve until Ctrl+C
pub async fn run() -> Result<()> {
    let config = AppConfig::load().context("Configuration is incomplete")?;
    let _guards = init_logging(&config.logging)?;
    log_system_info();
    info!("🔐 NIP portal: {}", config.nip.portal_url);
    info!("🔐 ISW portal: {}", config.isw.portal_url);
    info!("📁 Downloads go to {:?}", config.downloads.directory);

    let launcher = Arc::new(ChromiumLauncher::new(config.browser.executable.clone()));
    server::serve(config, launcher, shutdown_signal()).await
}

/// Wait for a shutdown signal (Ctrl+C)
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🛑 Received shutdown signal"),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
