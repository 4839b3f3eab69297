//! Decoding of the CDP notifications the recorder consumes.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::AdapterError;
use crate::ids::{CdpSessionId, RequestId, TargetId};
use crate::transport::TransportEvent;

/// Header map as delivered by the protocol.
pub type Headers = serde_json::Map<String, Value>;

/// A request was issued by the page (`Network.requestWillBeSent`).
#[derive(Clone, Debug, PartialEq)]
pub struct RequestStarted {
    pub request_id: RequestId,
    pub url: String,
    pub method: String,
    pub post_data: Option<String>,
    pub headers: Option<Headers>,
    /// Resource classification, e.g. `XHR`, `Fetch`, `Image`.
    pub resource_kind: Option<String>,
    pub page_url: Option<String>,
    /// Set when this notification continues a redirect chain of the same request id.
    pub is_redirect: bool,
}

/// Response status line and headers arrived (`Network.responseReceived`).
#[derive(Clone, Debug, PartialEq)]
pub struct HeadersReceived {
    pub request_id: RequestId,
    pub status: i64,
    pub headers: Option<Headers>,
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestFinished {
    pub request_id: RequestId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestFailed {
    pub request_id: RequestId,
    pub error_text: String,
}

/// Payload the page pushed through a CDP binding (`Runtime.bindingCalled`).
#[derive(Clone, Debug, PartialEq)]
pub struct PageSignal {
    pub binding: String,
    pub payload: String,
}

/// The attached target or its session went away.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetLost {
    pub target_id: Option<TargetId>,
    pub session_id: Option<CdpSessionId>,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InspectorPayload {
    RequestStarted(RequestStarted),
    HeadersReceived(HeadersReceived),
    RequestFinished(RequestFinished),
    RequestFailed(RequestFailed),
    PageSignal(PageSignal),
    TargetLost(TargetLost),
}

/// A decoded notification together with the session it was delivered on.
#[derive(Clone, Debug, PartialEq)]
pub struct InspectorEvent {
    pub session_id: Option<CdpSessionId>,
    pub payload: InspectorPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequestWillBeSent {
    request_id: String,
    #[serde(rename = "documentURL")]
    document_url: Option<String>,
    request: WireRequest,
    #[serde(rename = "type")]
    resource_type: Option<String>,
    redirect_response: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    url: String,
    method: String,
    post_data: Option<String>,
    headers: Option<Headers>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponseReceived {
    request_id: String,
    response: WireResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    status: f64,
    headers: Option<Headers>,
    mime_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLoading {
    request_id: String,
    #[serde(default)]
    error_text: Option<String>,
}

#[derive(Deserialize)]
struct WireBindingCalled {
    name: String,
    payload: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTargetEvent {
    target_id: Option<String>,
    session_id: Option<String>,
    reason: Option<String>,
    status: Option<String>,
}

fn decode<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, AdapterError> {
    serde_json::from_value(params).map_err(AdapterError::protocol)
}

impl InspectorEvent {
    /// Decode a raw transport notification.
    ///
    /// Returns `Ok(None)` for methods the recorder does not consume and an error when a consumed
    /// method carries a payload that does not match the protocol shape.
    pub fn from_transport(event: TransportEvent) -> Result<Option<Self>, AdapterError> {
        let TransportEvent {
            method,
            params,
            session_id,
        } = event;
        let session_id = session_id.map(CdpSessionId);

        let payload = match method.as_str() {
            "Network.requestWillBeSent" => {
                let wire: WireRequestWillBeSent = decode(params)?;
                InspectorPayload::RequestStarted(RequestStarted {
                    request_id: RequestId(wire.request_id),
                    url: wire.request.url,
                    method: wire.request.method,
                    post_data: wire.request.post_data,
                    headers: wire.request.headers,
                    resource_kind: wire.resource_type,
                    page_url: wire.document_url,
                    is_redirect: wire.redirect_response.is_some(),
                })
            }
            "Network.responseReceived" => {
                let wire: WireResponseReceived = decode(params)?;
                InspectorPayload::HeadersReceived(HeadersReceived {
                    request_id: RequestId(wire.request_id),
                    status: wire.response.status as i64,
                    headers: wire.response.headers,
                    mime_type: wire.response.mime_type,
                })
            }
            "Network.loadingFinished" => {
                let wire: WireLoading = decode(params)?;
                InspectorPayload::RequestFinished(RequestFinished {
                    request_id: RequestId(wire.request_id),
                })
            }
            "Network.loadingFailed" => {
                let wire: WireLoading = decode(params)?;
                InspectorPayload::RequestFailed(RequestFailed {
                    request_id: RequestId(wire.request_id),
                    error_text: wire.error_text.unwrap_or_else(|| "loading failed".into()),
                })
            }
            "Runtime.bindingCalled" => {
                let wire: WireBindingCalled = decode(params)?;
                InspectorPayload::PageSignal(PageSignal {
                    binding: wire.name,
                    payload: wire.payload,
                })
            }
            "Target.targetDestroyed" | "Target.targetCrashed" => {
                let wire: WireTargetEvent = decode(params)?;
                InspectorPayload::TargetLost(TargetLost {
                    target_id: wire.target_id.map(TargetId),
                    session_id: None,
                    reason: wire
                        .status
                        .unwrap_or_else(|| method.trim_start_matches("Target.").to_string()),
                })
            }
            "Target.detachedFromTarget" => {
                // Matched by session only: a stale detach of an earlier session must not tear
                // down a newer attachment to the same target.
                let wire: WireTargetEvent = decode(params)?;
                InspectorPayload::TargetLost(TargetLost {
                    target_id: None,
                    session_id: wire.session_id.map(CdpSessionId),
                    reason: "detachedFromTarget".into(),
                })
            }
            "Inspector.detached" => {
                let wire: WireTargetEvent = decode(params)?;
                InspectorPayload::TargetLost(TargetLost {
                    target_id: None,
                    session_id: session_id.clone(),
                    reason: wire.reason.unwrap_or_else(|| "inspector detached".into()),
                })
            }
            _ => {
                debug!(target: "cdp-adapter", %method, "unhandled cdp event");
                return Ok(None);
            }
        };

        Ok(Some(Self {
            session_id,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(method: &str, params: Value, session: Option<&str>) -> TransportEvent {
        TransportEvent {
            method: method.into(),
            params,
            session_id: session.map(str::to_string),
        }
    }

    #[test]
    fn decodes_request_will_be_sent() {
        let event = InspectorEvent::from_transport(raw(
            "Network.requestWillBeSent",
            json!({
                "requestId": "r1",
                "documentURL": "https://example.com/",
                "type": "XHR",
                "request": {
                    "url": "https://api.example.com/x",
                    "method": "POST",
                    "postData": "{\"a\":1}",
                    "headers": {"accept": "application/json"}
                }
            }),
            Some("S1"),
        ))
        .unwrap()
        .unwrap();

        assert_eq!(event.session_id, Some(CdpSessionId("S1".into())));
        match event.payload {
            InspectorPayload::RequestStarted(started) => {
                assert_eq!(started.request_id, RequestId("r1".into()));
                assert_eq!(started.method, "POST");
                assert_eq!(started.resource_kind.as_deref(), Some("XHR"));
                assert_eq!(started.page_url.as_deref(), Some("https://example.com/"));
                assert!(!started.is_redirect);
                assert!(started.headers.is_some());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn decodes_response_status_and_mime() {
        let event = InspectorEvent::from_transport(raw(
            "Network.responseReceived",
            json!({
                "requestId": "r1",
                "type": "XHR",
                "response": {"status": 201, "mimeType": "application/json", "headers": {}}
            }),
            Some("S1"),
        ))
        .unwrap()
        .unwrap();
        match event.payload {
            InspectorPayload::HeadersReceived(headers) => {
                assert_eq!(headers.status, 201);
                assert_eq!(headers.mime_type.as_deref(), Some("application/json"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn unknown_methods_are_skipped() {
        let decoded =
            InspectorEvent::from_transport(raw("Page.frameNavigated", json!({}), None)).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn malformed_known_method_is_a_protocol_error() {
        let err = InspectorEvent::from_transport(raw(
            "Network.loadingFinished",
            json!({"unexpected": true}),
            None,
        ))
        .unwrap_err();
        assert_eq!(err.kind, crate::AdapterErrorKind::Protocol);
    }

    #[test]
    fn detached_from_target_matches_by_session_only() {
        let event = InspectorEvent::from_transport(raw(
            "Target.detachedFromTarget",
            json!({"sessionId": "S1", "targetId": "T1"}),
            None,
        ))
        .unwrap()
        .unwrap();
        match event.payload {
            InspectorPayload::TargetLost(lost) => {
                assert!(lost.target_id.is_none());
                assert_eq!(lost.session_id, Some(CdpSessionId("S1".into())));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn target_destroyed_carries_target_id() {
        let event = InspectorEvent::from_transport(raw(
            "Target.targetDestroyed",
            json!({"targetId": "T9"}),
            None,
        ))
        .unwrap()
        .unwrap();
        match event.payload {
            InspectorPayload::TargetLost(lost) => {
                assert_eq!(lost.target_id, Some(TargetId("T9".into())));
                assert_eq!(lost.reason, "targetDestroyed");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
