//! Inspection channel: the operations the recorder performs against one attached target.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::InspectorEvent;
use crate::ids::{CdpSessionId, RequestId, TargetId};
use crate::metrics;
use crate::transport::{CdpTransport, CommandTarget};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetInfo {
    pub target_id: TargetId,
    pub url: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseBody {
    pub body: String,
    pub base64_encoded: bool,
}

/// Identifier of a script registered to run on every new document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptHandle(pub String);

#[async_trait]
pub trait Inspector: Send + Sync {
    /// The page target recording should attach to right now.
    async fn active_target(&self) -> Result<TargetInfo, AdapterError>;
    async fn attach(&self, target: &TargetId) -> Result<CdpSessionId, AdapterError>;
    async fn detach(&self, session: &CdpSessionId) -> Result<(), AdapterError>;
    async fn enable_network(&self, session: &CdpSessionId) -> Result<(), AdapterError>;
    async fn disable_network(&self, session: &CdpSessionId) -> Result<(), AdapterError>;
    async fn response_body(
        &self,
        session: &CdpSessionId,
        request: &RequestId,
    ) -> Result<ResponseBody, AdapterError>;
    /// Base64 PNG of the currently visible surface.
    async fn capture_screenshot(&self, session: &CdpSessionId) -> Result<String, AdapterError>;
    async fn install_instrumentation(
        &self,
        session: &CdpSessionId,
        binding: &str,
        source: &str,
    ) -> Result<ScriptHandle, AdapterError>;
    async fn remove_instrumentation(
        &self,
        session: &CdpSessionId,
        binding: &str,
        handle: &ScriptHandle,
        teardown: &str,
    ) -> Result<(), AdapterError>;
    /// Next decoded notification; `None` once the channel is closed for good.
    async fn next_event(&self) -> Option<InspectorEvent>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTargetInfo {
    target_id: String,
    #[serde(rename = "type")]
    target_type: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTargets {
    target_infos: Vec<WireTargetInfo>,
}

/// [`Inspector`] speaking CDP through a [`CdpTransport`].
pub struct CdpInspector {
    transport: Arc<dyn CdpTransport>,
    cfg: CdpConfig,
}

impl CdpInspector {
    pub fn new(cfg: CdpConfig, transport: Arc<dyn CdpTransport>) -> Self {
        Self { transport, cfg }
    }

    pub async fn start(&self) -> Result<(), AdapterError> {
        self.transport.start().await
    }

    async fn send(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let start = Instant::now();
        metrics::record_command(method);
        match self.transport.send_command(target, method, params).await {
            Ok(value) => {
                metrics::record_command_success(method, start.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method);
                Err(err)
            }
        }
    }

    async fn send_session(
        &self,
        session: &CdpSessionId,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.send(CommandTarget::Session(session.0.clone()), method, params)
            .await
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, AdapterError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Protocol).with_hint(format!("missing {field}"))
        })
}

#[async_trait]
impl Inspector for CdpInspector {
    /// The DevTools target list carries no focus information, so "active" means the first page
    /// target in the browser's listing. Set `target_id` to pin a specific tab instead.
    async fn active_target(&self) -> Result<TargetInfo, AdapterError> {
        let response = self
            .send(CommandTarget::Browser, "Target.getTargets", json!({}))
            .await?;
        let targets: WireTargets =
            serde_json::from_value(response).map_err(AdapterError::protocol)?;
        let pinned = self.cfg.target_id.as_deref();

        targets
            .target_infos
            .into_iter()
            .filter(|info| info.target_type == "page")
            .find(|info| pinned.map_or(true, |id| info.target_id == id))
            .map(|info| TargetInfo {
                target_id: TargetId(info.target_id),
                url: info.url,
                title: info.title,
            })
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint(match pinned {
                    Some(id) => format!("page target {id} not found"),
                    None => "no page target available".to_string(),
                })
            })
    }

    async fn attach(&self, target: &TargetId) -> Result<CdpSessionId, AdapterError> {
        let response = self
            .send(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target.0, "flatten": true }),
            )
            .await?;
        let session = string_field(&response, "sessionId")?;
        debug!(target: "cdp-adapter", %target, session = %session, "attached to target");
        Ok(CdpSessionId(session))
    }

    async fn detach(&self, session: &CdpSessionId) -> Result<(), AdapterError> {
        self.send(
            CommandTarget::Browser,
            "Target.detachFromTarget",
            json!({ "sessionId": session.0 }),
        )
        .await
        .map(|_| ())
    }

    async fn enable_network(&self, session: &CdpSessionId) -> Result<(), AdapterError> {
        self.send_session(session, "Network.enable", json!({}))
            .await
            .map(|_| ())
    }

    async fn disable_network(&self, session: &CdpSessionId) -> Result<(), AdapterError> {
        self.send_session(session, "Network.disable", json!({}))
            .await
            .map(|_| ())
    }

    async fn response_body(
        &self,
        session: &CdpSessionId,
        request: &RequestId,
    ) -> Result<ResponseBody, AdapterError> {
        let response = self
            .send_session(
                session,
                "Network.getResponseBody",
                json!({ "requestId": request.0 }),
            )
            .await?;
        Ok(ResponseBody {
            body: string_field(&response, "body")?,
            base64_encoded: response
                .get("base64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    async fn capture_screenshot(&self, session: &CdpSessionId) -> Result<String, AdapterError> {
        let response = self
            .send_session(session, "Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        string_field(&response, "data")
    }

    async fn install_instrumentation(
        &self,
        session: &CdpSessionId,
        binding: &str,
        source: &str,
    ) -> Result<ScriptHandle, AdapterError> {
        self.send_session(session, "Runtime.enable", json!({}))
            .await?;
        self.send_session(session, "Runtime.addBinding", json!({ "name": binding }))
            .await?;
        let response = self
            .send_session(
                session,
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": source }),
            )
            .await?;
        let handle = ScriptHandle(string_field(&response, "identifier")?);
        self.send_session(
            session,
            "Runtime.evaluate",
            json!({ "expression": source, "returnByValue": true }),
        )
        .await?;
        Ok(handle)
    }

    async fn remove_instrumentation(
        &self,
        session: &CdpSessionId,
        binding: &str,
        handle: &ScriptHandle,
        teardown: &str,
    ) -> Result<(), AdapterError> {
        if let Err(err) = self
            .send_session(session, "Runtime.evaluate", json!({ "expression": teardown }))
            .await
        {
            warn!(target: "cdp-adapter", ?err, "page teardown script failed");
        }
        self.send_session(
            session,
            "Page.removeScriptToEvaluateOnNewDocument",
            json!({ "identifier": handle.0 }),
        )
        .await?;
        self.send_session(session, "Runtime.removeBinding", json!({ "name": binding }))
            .await
            .map(|_| ())
    }

    async fn next_event(&self) -> Option<InspectorEvent> {
        loop {
            let raw = self.transport.next_event().await?;
            match InspectorEvent::from_transport(raw) {
                Ok(Some(event)) => {
                    metrics::record_event();
                    return Some(event);
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!(target: "cdp-adapter", ?err, "dropping undecodable notification");
                }
            }
        }
    }
}
