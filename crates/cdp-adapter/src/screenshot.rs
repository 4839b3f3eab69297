use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flowtap_flow_store::Screenshot;
use tracing::{debug, warn};

use crate::ids::CdpSessionId;
use crate::inspector::Inspector;
use crate::metrics;

/// Best-effort capture of the visible surface of the attached target. Never fails.
#[derive(Clone)]
pub struct ScreenshotService {
    inspector: Arc<dyn Inspector>,
}

impl ScreenshotService {
    pub fn new(inspector: Arc<dyn Inspector>) -> Self {
        Self { inspector }
    }

    pub async fn capture(&self, session: &CdpSessionId) -> Option<Screenshot> {
        let data = match self.inspector.capture_screenshot(session).await {
            Ok(data) => data,
            Err(err) => {
                warn!(target: "cdp-adapter", ?err, "screenshot capture failed");
                metrics::record_screenshot(false);
                return None;
            }
        };

        match STANDARD.decode(data.as_bytes()) {
            Ok(bytes) if !bytes.is_empty() => {
                debug!(target: "cdp-adapter", bytes = bytes.len(), "screenshot captured");
                metrics::record_screenshot(true);
                Some(Screenshot::from_png_base64(&data))
            }
            Ok(_) => {
                warn!(target: "cdp-adapter", "screenshot capture returned no data");
                metrics::record_screenshot(false);
                None
            }
            Err(err) => {
                warn!(target: "cdp-adapter", ?err, "screenshot payload is not base64");
                metrics::record_screenshot(false);
                None
            }
        }
    }
}
