//! FlowTap request correlator.
//!
//! Turns the interleaved request-started / headers-received / finished notifications of the
//! attached target into one finalized [`NetworkRecord`] per request id. Finalization runs as a
//! small task per request that awaits the body fetch and (optionally) a screenshot. Removing the
//! request from the pending table is the single claim that gates it, so duplicate notifications
//! can never finalize twice.
//!
//! Notifications for one request id are expected in protocol order (start, headers, finished);
//! nothing is reordered here.

pub mod config;
pub mod metrics;
pub mod policy;
pub mod port;

use std::sync::Arc;
use std::time::Instant;

use cdp_adapter::{
    HeadersReceived, InspectorPayload, RequestFailed, RequestFinished, RequestId, RequestStarted,
    ResponseBody,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use flowtap_flow_store::{BodyEncoding, NetworkFlow, NetworkRecord, RequestMeta, ResponseMeta};
use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

pub use config::{CaptureSettings, SettingsHandle, SettingsUpdate};
pub use policy::IgnorePolicy;
pub use port::{CdpTapPort, TapPort};

/// Errors emitted by the tap surface.
#[derive(Clone, Debug, Error)]
pub enum TapError {
    #[error("response body unavailable: {0}")]
    BodyUnavailable(String),
}

#[derive(Debug)]
struct PendingRequest {
    step: u64,
    generation: u64,
    request: RequestMeta,
    page_url: Option<String>,
    response: Option<ResponseMeta>,
    started_at: Instant,
}

/// Request correlator for the network flow.
pub struct RequestCorrelator {
    flow: Arc<NetworkFlow>,
    settings: SettingsHandle,
    policy: IgnorePolicy,
    pending: DashMap<RequestId, PendingRequest>,
    /// Ids that were ignored or already finalized in the current generation.
    retired: DashSet<RequestId>,
    port: RwLock<Option<Arc<dyn TapPort>>>,
    tracker: TaskTracker,
}

impl RequestCorrelator {
    pub fn new(flow: Arc<NetworkFlow>, settings: SettingsHandle) -> Self {
        Self::with_policy(flow, settings, IgnorePolicy::default())
    }

    pub fn with_policy(
        flow: Arc<NetworkFlow>,
        settings: SettingsHandle,
        policy: IgnorePolicy,
    ) -> Self {
        Self {
            flow,
            settings,
            policy,
            pending: DashMap::new(),
            retired: DashSet::new(),
            port: RwLock::new(None),
            tracker: TaskTracker::new(),
        }
    }

    pub fn flow(&self) -> &Arc<NetworkFlow> {
        &self.flow
    }

    /// Start a fresh flow generation and accept notifications through `port`.
    pub fn begin(&self, port: Arc<dyn TapPort>) -> u64 {
        let generation = self.flow.reset();
        self.pending.clear();
        self.retired.clear();
        *self.port.write() = Some(port);
        debug!(target: "network-tap", generation, "correlator bound");
        generation
    }

    /// Stop accepting notifications and drop every pending request.
    ///
    /// Finalizations that already claimed their request keep running. Returns the number of
    /// pending requests abandoned.
    pub fn end(&self) -> usize {
        *self.port.write() = None;
        let abandoned = self.pending.len();
        self.pending.clear();
        if abandoned > 0 {
            debug!(target: "network-tap", abandoned, "pending requests abandoned");
        }
        abandoned
    }

    pub fn is_bound(&self) -> bool {
        self.port.read().is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every finalization spawned so far.
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Route a decoded notification; non-network payloads are ignored.
    pub fn ingest(&self, payload: InspectorPayload) {
        match payload {
            InspectorPayload::RequestStarted(event) => self.on_request_start(event),
            InspectorPayload::HeadersReceived(event) => self.on_headers_received(event),
            InspectorPayload::RequestFinished(event) => self.on_finished(event),
            InspectorPayload::RequestFailed(event) => self.on_failed(event),
            InspectorPayload::PageSignal(_) | InspectorPayload::TargetLost(_) => {}
        }
    }

    pub fn on_request_start(&self, event: RequestStarted) {
        if !self.is_bound() {
            return;
        }
        let id = event.request_id;
        if self.retired.contains(&id) {
            trace!(target: "network-tap", request_id = %id, "request id already retired");
            return;
        }
        let headers = if self.settings.current().include_request_headers {
            event.headers
        } else {
            None
        };

        match self.pending.entry(id) {
            Entry::Occupied(_) if !event.is_redirect => {
                trace!(target: "network-tap", url = %event.url, "duplicate request start ignored");
            }
            Entry::Occupied(mut entry) => {
                // Redirect hop: same request, new location. Step and start time stay.
                let request_id = entry.key().clone();
                let pending = entry.get_mut();
                pending.request = RequestMeta {
                    url: event.url,
                    method: event.method,
                    post_data: event.post_data,
                    headers,
                };
                pending.response = None;
                debug!(
                    target: "network-tap",
                    %request_id,
                    step = pending.step,
                    url = %pending.request.url,
                    "request redirected"
                );
            }
            Entry::Vacant(entry) => {
                if self
                    .policy
                    .should_ignore(event.resource_kind.as_deref(), &event.url)
                {
                    trace!(target: "network-tap", request_id = %entry.key(), url = %event.url, "ignored static asset");
                    metrics::record_ignored();
                    self.retired.insert(entry.into_key());
                    return;
                }
                let reservation = self.flow.reserve_step();
                debug!(
                    target: "network-tap",
                    request_id = %entry.key(),
                    step = reservation.step,
                    method = %event.method,
                    url = %event.url,
                    "request registered"
                );
                entry.insert(PendingRequest {
                    step: reservation.step,
                    generation: reservation.generation,
                    request: RequestMeta {
                        url: event.url,
                        method: event.method,
                        post_data: event.post_data,
                        headers,
                    },
                    page_url: event.page_url,
                    response: None,
                    started_at: Instant::now(),
                });
            }
        }
    }

    pub fn on_headers_received(&self, event: HeadersReceived) {
        let Some(mut pending) = self.pending.get_mut(&event.request_id) else {
            return;
        };
        let headers = if self.settings.current().include_response_headers {
            event.headers
        } else {
            None
        };
        pending.response = Some(ResponseMeta {
            status: event.status,
            headers,
            mime_type: event.mime_type,
        });
    }

    pub fn on_finished(&self, event: RequestFinished) {
        self.finalize(event.request_id, None);
    }

    /// A failed load finalizes without a body fetch.
    pub fn on_failed(&self, event: RequestFailed) {
        self.finalize(event.request_id, Some(event.error_text));
    }

    fn finalize(&self, id: RequestId, error_text: Option<String>) {
        let Some(port) = self.port.read().clone() else {
            return;
        };
        let Some((id, pending)) = self.pending.remove(&id) else {
            trace!(target: "network-tap", request_id = %id, "no pending request");
            return;
        };
        self.retired.insert(id.clone());

        let capture = self.settings.current().capture_network_screenshots;
        let flow = Arc::clone(&self.flow);
        self.tracker.spawn(async move {
            let fetch_body = error_text.is_none();
            let body = async {
                if !fetch_body {
                    return None;
                }
                match port.response_body(&id).await {
                    Ok(body) => Some(body),
                    Err(err) => {
                        warn!(target: "network-tap", request_id = %id, %err, "body fetch failed");
                        metrics::record_body_failure();
                        None
                    }
                }
            };
            let screenshot = async {
                if capture {
                    port.capture_screenshot().await
                } else {
                    None
                }
            };
            let (body, screenshot) = tokio::join!(body, screenshot);

            let (body, body_encoding) = match body {
                Some(ResponseBody {
                    body,
                    base64_encoded,
                }) => (Some(body), BodyEncoding::from_base64_flag(base64_encoded)),
                None => (None, BodyEncoding::default()),
            };
            let step = pending.step;
            let record = NetworkRecord {
                step,
                request: pending.request,
                page_url: pending.page_url,
                response: pending.response,
                body,
                body_encoding,
                error_text,
                duration_ms: pending.started_at.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
                screenshot,
            };

            if flow.append(pending.generation, record) {
                metrics::record_finalized();
                debug!(target: "network-tap", request_id = %id, step, "network record appended");
            } else {
                metrics::record_discarded();
                debug!(target: "network-tap", request_id = %id, step, "flow was reset; record dropped");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowtap_flow_store::Screenshot;

    struct EchoPort;

    #[async_trait]
    impl TapPort for EchoPort {
        async fn response_body(&self, request: &RequestId) -> Result<ResponseBody, TapError> {
            Ok(ResponseBody {
                body: format!("body-{request}"),
                base64_encoded: false,
            })
        }

        async fn capture_screenshot(&self) -> Option<Screenshot> {
            None
        }
    }

    fn started(id: &str, url: &str) -> RequestStarted {
        RequestStarted {
            request_id: RequestId::from(id),
            url: url.into(),
            method: "GET".into(),
            post_data: None,
            headers: None,
            resource_kind: Some("XHR".into()),
            page_url: Some("https://a/".into()),
            is_redirect: false,
        }
    }

    #[tokio::test]
    async fn unbound_correlator_ignores_notifications() {
        let correlator =
            RequestCorrelator::new(Arc::new(NetworkFlow::new()), SettingsHandle::default());
        correlator.on_request_start(started("r1", "https://a/x"));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn end_drops_pending_but_keeps_flow() {
        let flow = Arc::new(NetworkFlow::new());
        let correlator = RequestCorrelator::new(Arc::clone(&flow), SettingsHandle::default());
        correlator.begin(Arc::new(EchoPort));
        correlator.on_request_start(started("r1", "https://a/x"));
        correlator.on_finished(RequestFinished {
            request_id: RequestId::from("r1"),
        });
        correlator.on_request_start(started("r2", "https://a/y"));
        assert_eq!(correlator.end(), 1);
        correlator.settle().await;

        assert_eq!(flow.len(), 1);
        assert_eq!(correlator.pending_len(), 0);
        assert!(!correlator.is_bound());
    }
}
