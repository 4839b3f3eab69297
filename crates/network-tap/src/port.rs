use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{
    AdapterError, CdpSessionId, Inspector, RequestId, ResponseBody, ScreenshotService,
};
use flowtap_flow_store::Screenshot;

use crate::TapError;

/// Auxiliary queries the correlator issues while finalizing a request.
#[async_trait]
pub trait TapPort: Send + Sync {
    async fn response_body(&self, request: &RequestId) -> Result<ResponseBody, TapError>;
    /// Best effort; `None` on any failure.
    async fn capture_screenshot(&self) -> Option<Screenshot>;
}

/// Port bound to one attached CDP session.
pub struct CdpTapPort {
    inspector: Arc<dyn Inspector>,
    screenshots: ScreenshotService,
    session: CdpSessionId,
}

impl CdpTapPort {
    pub fn new(inspector: Arc<dyn Inspector>, session: CdpSessionId) -> Self {
        Self {
            screenshots: ScreenshotService::new(Arc::clone(&inspector)),
            inspector,
            session,
        }
    }
}

fn map_adapter_error(err: AdapterError) -> TapError {
    let hint = err.hint.unwrap_or_default();
    TapError::BodyUnavailable(format!("cdp error {:?}: {}", err.kind, hint))
}

#[async_trait]
impl TapPort for CdpTapPort {
    async fn response_body(&self, request: &RequestId) -> Result<ResponseBody, TapError> {
        self.inspector
            .response_body(&self.session, request)
            .await
            .map_err(map_adapter_error)
    }

    async fn capture_screenshot(&self) -> Option<Screenshot> {
        self.screenshots.capture(&self.session).await
    }
}
