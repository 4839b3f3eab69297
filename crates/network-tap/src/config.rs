//! Capture toggles shared by the correlator and the UI sequencer.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Sample request headers at request start.
    pub include_request_headers: bool,
    /// Sample response headers when they arrive.
    pub include_response_headers: bool,
    pub capture_network_screenshots: bool,
    pub capture_ui_screenshots: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            include_request_headers: false,
            include_response_headers: false,
            capture_network_screenshots: false,
            capture_ui_screenshots: true,
        }
    }
}

/// Partial replacement of [`CaptureSettings`]; absent fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_request_headers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_response_headers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_network_screenshots: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_ui_screenshots: Option<bool>,
}

impl CaptureSettings {
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(value) = update.include_request_headers {
            self.include_request_headers = value;
        }
        if let Some(value) = update.include_response_headers {
            self.include_response_headers = value;
        }
        if let Some(value) = update.capture_network_screenshots {
            self.capture_network_screenshots = value;
        }
        if let Some(value) = update.capture_ui_screenshots {
            self.capture_ui_screenshots = value;
        }
    }
}

/// Live settings read at the moment each notification is handled.
#[derive(Clone, Debug, Default)]
pub struct SettingsHandle(Arc<RwLock<CaptureSettings>>);

impl SettingsHandle {
    pub fn new(settings: CaptureSettings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    pub fn current(&self) -> CaptureSettings {
        self.0.read().clone()
    }

    pub fn update(&self, update: &SettingsUpdate) -> CaptureSettings {
        let mut guard = self.0.write();
        guard.apply(update);
        guard.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_keeps_other_toggles() {
        let handle = SettingsHandle::default();
        let update: SettingsUpdate =
            serde_json::from_str(r#"{"includeResponseHeaders": true}"#).unwrap();
        let current = handle.update(&update);
        assert!(current.include_response_headers);
        assert!(!current.include_request_headers);
        assert!(current.capture_ui_screenshots);
        assert_eq!(handle.current(), current);
    }
}
