use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cdp_adapter::{CdpInspector, CdpTransport, ChromiumTransport};
use flowtap::{RecorderConfig, SessionController};
use tracing::info;

use super::output::OutputFormat;

pub struct CliContext {
    config: Arc<RecorderConfig>,
    config_path: PathBuf,
    metrics_port: u16,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(
        config: RecorderConfig,
        config_path: PathBuf,
        metrics_port: u16,
        output: OutputFormat,
    ) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            metrics_port,
            output,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn metrics_port(&self) -> u16 {
        self.metrics_port
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }
}

/// Reach the browser described by `config` and build a controller on top of it.
pub async fn connect_controller(config: &RecorderConfig) -> Result<Arc<SessionController>> {
    let cdp = config.cdp.to_cdp_config();
    if !cdp.can_connect() {
        bail!("no browser to record: set cdp.ws_url (or FLOWTAP_WS_URL) or install Chromium");
    }

    let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cdp.clone()));
    let inspector = Arc::new(CdpInspector::new(cdp, transport));
    inspector
        .start()
        .await
        .context("Failed to connect to the browser")?;
    info!(
        ws_url = config.cdp.ws_url.as_deref().unwrap_or("(launched)"),
        "Connected to browser"
    );

    Ok(Arc::new(SessionController::new(
        inspector,
        config.capture.clone(),
    )))
}
