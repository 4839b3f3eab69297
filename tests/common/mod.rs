//! Scripted [`Inspector`] shared by the session and control surface tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{
    AdapterError, AdapterErrorKind, CdpSessionId, HeadersReceived, Inspector, InspectorEvent,
    InspectorPayload, PageSignal, RequestFinished, RequestId, RequestStarted, ResponseBody,
    ScriptHandle, TargetId, TargetInfo, TargetLost,
};
use flowtap::instrumentation::BINDING_NAME;
use tokio::sync::{mpsc, Mutex, Notify};

pub const TARGET: &str = "T1";
pub const SESSION: &str = "S1";
pub const PAGE_URL: &str = "https://shop.test/";
/// Base64 of `png`.
pub const SHOT: &str = "cG5n";

pub struct MockInspector {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<InspectorEvent>>>,
    rx: Mutex<mpsc::UnboundedReceiver<InspectorEvent>>,
    calls: std::sync::Mutex<Vec<String>>,
    attach_gate: std::sync::Mutex<Option<Arc<Notify>>>,
    screenshot_gate: std::sync::Mutex<Option<Arc<Notify>>>,
    pub attaches: AtomicUsize,
    pub detaches: AtomicUsize,
    pub screenshots: AtomicUsize,
    pub fail_target: AtomicBool,
    pub fail_enable: AtomicBool,
    pub fail_detach: AtomicBool,
}

impl MockInspector {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx: std::sync::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            calls: std::sync::Mutex::new(Vec::new()),
            attach_gate: std::sync::Mutex::new(None),
            screenshot_gate: std::sync::Mutex::new(None),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            screenshots: AtomicUsize::new(0),
            fail_target: AtomicBool::new(false),
            fail_enable: AtomicBool::new(false),
            fail_detach: AtomicBool::new(false),
        })
    }

    /// Hold every `attach` until the returned gate is notified.
    pub fn gate_attach(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.attach_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold the next screenshot capture (only that one) until the returned gate is notified.
    pub fn gate_screenshot(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.screenshot_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, method: &str) -> bool {
        self.calls().iter().any(|call| call == method)
    }

    pub fn push(&self, event: InspectorEvent) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Close the notification channel; `next_event` yields `None` once drained.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }
}

fn unavailable(hint: &str) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Unavailable).with_hint(hint)
}

#[async_trait]
impl Inspector for MockInspector {
    async fn active_target(&self) -> Result<TargetInfo, AdapterError> {
        self.record("active_target");
        if self.fail_target.load(Ordering::SeqCst) {
            return Err(AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint("no page targets"));
        }
        Ok(TargetInfo {
            target_id: TargetId(TARGET.into()),
            url: PAGE_URL.into(),
            title: "Shop".into(),
        })
    }

    async fn attach(&self, _target: &TargetId) -> Result<CdpSessionId, AdapterError> {
        self.record("attach");
        self.attaches.fetch_add(1, Ordering::SeqCst);
        let gate = self.attach_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(CdpSessionId(SESSION.into()))
    }

    async fn detach(&self, _session: &CdpSessionId) -> Result<(), AdapterError> {
        self.record("detach");
        self.detaches.fetch_add(1, Ordering::SeqCst);
        if self.fail_detach.load(Ordering::SeqCst) {
            return Err(unavailable("detach refused"));
        }
        Ok(())
    }

    async fn enable_network(&self, _session: &CdpSessionId) -> Result<(), AdapterError> {
        self.record("enable_network");
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(unavailable("channel already in use"));
        }
        Ok(())
    }

    async fn disable_network(&self, _session: &CdpSessionId) -> Result<(), AdapterError> {
        self.record("disable_network");
        Ok(())
    }

    async fn response_body(
        &self,
        _session: &CdpSessionId,
        request: &RequestId,
    ) -> Result<ResponseBody, AdapterError> {
        self.record("response_body");
        Ok(ResponseBody {
            body: format!("ok:{request}"),
            base64_encoded: false,
        })
    }

    async fn capture_screenshot(&self, _session: &CdpSessionId) -> Result<String, AdapterError> {
        self.record("capture_screenshot");
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        let gate = self.screenshot_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(SHOT.into())
    }

    async fn install_instrumentation(
        &self,
        _session: &CdpSessionId,
        binding: &str,
        _source: &str,
    ) -> Result<ScriptHandle, AdapterError> {
        self.record("install_instrumentation");
        assert_eq!(binding, BINDING_NAME);
        Ok(ScriptHandle("script-1".into()))
    }

    async fn remove_instrumentation(
        &self,
        _session: &CdpSessionId,
        _binding: &str,
        handle: &ScriptHandle,
        _teardown: &str,
    ) -> Result<(), AdapterError> {
        self.record("remove_instrumentation");
        assert_eq!(handle.0, "script-1");
        Ok(())
    }

    async fn next_event(&self) -> Option<InspectorEvent> {
        self.rx.lock().await.recv().await
    }
}

fn on_session(payload: InspectorPayload) -> InspectorEvent {
    InspectorEvent {
        session_id: Some(CdpSessionId(SESSION.into())),
        payload,
    }
}

pub fn started(id: &str, url: &str, kind: &str) -> InspectorEvent {
    on_session(InspectorPayload::RequestStarted(RequestStarted {
        request_id: id.into(),
        url: url.into(),
        method: "GET".into(),
        post_data: None,
        headers: None,
        resource_kind: Some(kind.into()),
        page_url: Some(PAGE_URL.into()),
        is_redirect: false,
    }))
}

pub fn headers(id: &str, status: i64) -> InspectorEvent {
    on_session(InspectorPayload::HeadersReceived(HeadersReceived {
        request_id: id.into(),
        status,
        headers: None,
        mime_type: Some("application/json".into()),
    }))
}

pub fn finished(id: &str) -> InspectorEvent {
    on_session(InspectorPayload::RequestFinished(RequestFinished {
        request_id: id.into(),
    }))
}

pub fn page_signal(payload: &str) -> InspectorEvent {
    on_session(InspectorPayload::PageSignal(PageSignal {
        binding: BINDING_NAME.into(),
        payload: payload.into(),
    }))
}

pub fn target_lost(target: &str) -> InspectorEvent {
    InspectorEvent {
        session_id: None,
        payload: InspectorPayload::TargetLost(TargetLost {
            target_id: Some(TargetId(target.into())),
            session_id: None,
            reason: "targetDestroyed".into(),
        }),
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
