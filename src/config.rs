//! Recorder configuration.
//!
//! Sources, lowest priority first: built-in defaults, the YAML file, `FLOWTAP_*` environment
//! variables, then command line flags (applied by the CLI).

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use cdp_adapter::CdpConfig;
use network_tap::CaptureSettings;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::FlowTapError;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub cdp: CdpSection,
    pub capture: CaptureSettings,
    pub server: ServerSection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpSection {
    /// DevTools websocket of a running browser; when absent a local Chromium is launched.
    pub ws_url: Option<String>,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub user_data_dir: PathBuf,
    pub command_deadline_ms: u64,
    /// Record this target instead of the first page target.
    pub target_id: Option<String>,
}

impl Default for CdpSection {
    fn default() -> Self {
        let defaults = CdpConfig::default();
        Self {
            ws_url: None,
            chrome_path: None,
            headless: defaults.headless,
            user_data_dir: defaults.user_data_dir,
            command_deadline_ms: defaults.default_deadline_ms,
            target_id: None,
        }
    }
}

impl CdpSection {
    pub fn to_cdp_config(&self) -> CdpConfig {
        CdpConfig {
            websocket_url: self.ws_url.clone(),
            executable: self.chrome_path.clone(),
            user_data_dir: self.user_data_dir.clone(),
            headless: self.headless,
            default_deadline_ms: self.command_deadline_ms,
            target_id: self.target_id.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub control_addr: SocketAddr,
    /// 0 disables the metrics endpoint.
    pub metrics_port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            control_addr: SocketAddr::from(([127, 0, 0, 1], 8710)),
            metrics_port: 9090,
        }
    }
}

impl RecorderConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, FlowTapError> {
        serde_yaml::from_str(raw).map_err(|err| FlowTapError::Config(err.to_string()))
    }

    /// Apply `FLOWTAP_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let flag = |key: &str| {
            let raw = text(key)?;
            let parsed = parse_flag(&raw);
            if parsed.is_none() {
                warn!(%key, value = %raw, "ignoring unparsable boolean override");
            }
            parsed
        };

        if let Some(url) = text("FLOWTAP_WS_URL") {
            self.cdp.ws_url = Some(url);
        }
        if let Some(path) = text("FLOWTAP_CHROME") {
            self.cdp.chrome_path = Some(PathBuf::from(path));
        }
        if let Some(headless) = flag("FLOWTAP_HEADLESS") {
            self.cdp.headless = headless;
        }
        if let Some(target) = text("FLOWTAP_TARGET") {
            self.cdp.target_id = Some(target);
        }
        if let Some(value) = flag("FLOWTAP_CAPTURE_NETWORK_SCREENSHOTS") {
            self.capture.capture_network_screenshots = value;
        }
        if let Some(value) = flag("FLOWTAP_CAPTURE_UI_SCREENSHOTS") {
            self.capture.capture_ui_screenshots = value;
        }
        if let Some(value) = flag("FLOWTAP_INCLUDE_REQUEST_HEADERS") {
            self.capture.include_request_headers = value;
        }
        if let Some(value) = flag("FLOWTAP_INCLUDE_RESPONSE_HEADERS") {
            self.capture.include_response_headers = value;
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
