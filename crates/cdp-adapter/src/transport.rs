use std::collections::HashMap;
use std::convert::TryInto;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::util::{extract_ws_url, validate_ws_url};

const OUTBOUND_CAPACITY: usize = 128;
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);

/// A raw DevTools notification, still undecoded.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

/// Where a command is routed: the browser endpoint or one flattened session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

/// Transport used when no browser is configured; every command fails.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        None
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(unavailable(format!("no browser configured; cannot send {method}")))
    }
}

/// DevTools websocket transport, connecting to `websocket_url` or launching a local Chromium.
///
/// The link is opened by the first command. Once it dies every later command fails and
/// `next_event` yields `None`; a fresh transport is needed to reconnect.
pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Mutex<Option<Arc<Link>>>,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
        }
    }

    async fn live_link(&self) -> Result<Arc<Link>, AdapterError> {
        let mut slot = self.link.lock().await;
        match slot.as_ref() {
            Some(link) if link.is_open() => Ok(Arc::clone(link)),
            Some(_) => Err(io_error("devtools link closed; restart to reconnect")),
            None => {
                let link = Arc::new(Link::open(&self.cfg).await?);
                *slot = Some(Arc::clone(&link));
                Ok(link)
            }
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms.max(1))
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        self.send_command(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
        )
        .await
        .map(|_| ())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        let link = self.link.lock().await.clone();
        let Some(link) = link else {
            warn!(target: "cdp-transport", "next_event called before start");
            return None;
        };
        let next = link.events.lock().await.recv().await;
        next
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let link = self.live_link().await?;
        link.call(target, method, params, self.deadline()).await
    }
}

type Reply = oneshot::Sender<Result<Value, AdapterError>>;

struct Outbound {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: Reply,
}

/// One open DevTools connection plus the browser process it may own.
struct Link {
    outbound: mpsc::Sender<Outbound>,
    events: Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    pump: JoinHandle<()>,
    browser: Mutex<Option<Child>>,
    open: Arc<AtomicBool>,
}

impl Link {
    async fn open(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        let (ws_url, browser) = match &cfg.websocket_url {
            Some(url) => (url.clone(), None),
            None => {
                let (child, url) = spawn_browser(cfg).await?;
                (url, Some(child))
            }
        };
        validate_ws_url(&ws_url)?;

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| io_error(format!("connect {ws_url}: {err}")).retriable(true))?;

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (events_tx, events) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let pump = Pump {
            conn,
            outbound_rx,
            events_tx,
            awaiting: HashMap::new(),
        };
        let flag = Arc::clone(&open);
        let pump = tokio::spawn(async move {
            match pump.run().await {
                Ok(()) => debug!(target: "cdp-transport", "devtools link closed"),
                Err(err) => warn!(target: "cdp-transport", %err, "devtools link failed"),
            }
            flag.store(false, Ordering::Release);
        });

        info!(target: "cdp-transport", url = %ws_url, launched = browser.is_some(), "devtools link open");
        Ok(Self {
            outbound,
            events: Mutex::new(events),
            pump,
            browser: Mutex::new(browser),
            open,
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, answer) = oneshot::channel();
        let outbound = Outbound {
            target,
            method: method.to_string(),
            params,
            reply,
        };
        if self.outbound.send(outbound).await.is_err() {
            return Err(io_error("devtools link is closed"));
        }

        tokio::time::timeout(deadline, answer)
            .await
            .map_err(|_| {
                AdapterError::new(AdapterErrorKind::Timeout)
                    .with_hint(format!("{method} got no answer within {deadline:?}"))
                    .retriable(true)
            })?
            .unwrap_or_else(|_| Err(io_error(format!("link dropped while {method} was in flight"))))
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
        self.pump.abort();

        let Some(mut child) = self.browser.get_mut().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", ?err, "could not stop launched browser");
                    }
                });
            }
            Err(_) => warn!(target: "cdp-transport", "no runtime left to stop launched browser"),
        }
    }
}

/// Owns the connection: submits outbound commands, pairs answers with callers and forwards
/// notifications until either side goes away.
///
/// Forwarding never waits on the consumer: answers to commands must keep flowing while the
/// consumer is itself awaiting one.
struct Pump {
    conn: Connection<CdpEventMessage>,
    outbound_rx: mpsc::Receiver<Outbound>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    awaiting: HashMap<CallId, Reply>,
}

impl Pump {
    async fn run(mut self) -> Result<(), AdapterError> {
        loop {
            tokio::select! {
                outbound = self.outbound_rx.recv() => match outbound {
                    Some(outbound) => self.submit(outbound),
                    None => {
                        self.fail_all(io_error("transport dropped"));
                        return Ok(());
                    }
                },
                incoming = self.conn.next() => match incoming {
                    Some(Ok(Message::Response(response))) => self.answer(response),
                    Some(Ok(Message::Event(event))) => self.forward(event),
                    Some(Err(err)) => {
                        let err = io_error(err.to_string());
                        self.fail_all(err.clone());
                        return Err(err);
                    }
                    None => {
                        self.fail_all(io_error("devtools connection closed"));
                        return Ok(());
                    }
                },
            }
        }
    }

    fn submit(&mut self, outbound: Outbound) {
        let Outbound {
            target,
            method,
            params,
            reply,
        } = outbound;
        let session = match target {
            CommandTarget::Browser => None,
            CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
        };
        match self
            .conn
            .submit_command(MethodId::from(method.clone()), session, params)
        {
            Ok(call) => {
                self.awaiting.insert(call, reply);
            }
            Err(err) => {
                debug!(target: "cdp-transport", %method, %err, "command not submitted");
                let _ = reply.send(Err(io_error(format!("submit {method}: {err}"))));
            }
        }
    }

    fn answer(&mut self, response: Response) {
        match self.awaiting.remove(&response.id) {
            Some(reply) => {
                let _ = reply.send(response_value(response));
            }
            None => debug!(target: "cdp-transport", id = ?response.id, "answer for unknown call"),
        }
    }

    fn forward(&self, event: CdpEventMessage) {
        let raw: Result<CdpJsonEventMessage, _> = event.try_into();
        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                warn!(target: "cdp-transport", %err, "undecodable devtools notification");
                return;
            }
        };
        let event = TransportEvent {
            method: raw.method.into_owned(),
            params: raw.params,
            session_id: raw.session_id,
        };
        if self.events_tx.send(event).is_err() {
            debug!(target: "cdp-transport", "event receiver gone; notification dropped");
        }
    }

    fn fail_all(&mut self, err: AdapterError) {
        for (_, reply) in self.awaiting.drain() {
            let _ = reply.send(Err(err.clone()));
        }
    }
}

fn response_value(response: Response) -> Result<Value, AdapterError> {
    match (response.result, response.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(io_error(format!(
            "devtools error {}: {}",
            error.code, error.message
        ))),
        (None, None) => Err(AdapterError::protocol("answer carried neither result nor error")),
    }
}

fn launch_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    let executable = cfg
        .resolve_executable()
        .ok_or_else(|| unavailable("no chrome executable found; set FLOWTAP_CHROME or pass --ws-url"))?;
    std::fs::create_dir_all(&cfg.user_data_dir).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!(
            "profile dir {}: {err}",
            cfg.user_data_dir.display()
        ))
    })?;

    let builder = BrowserConfig::builder()
        .chrome_executable(executable)
        .user_data_dir(cfg.user_data_dir.clone())
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(LAUNCH_TIMEOUT)
        .args(vec![
            "--no-first-run",
            "--no-default-browser-check",
            "--remote-allow-origins=*",
        ]);
    let builder = if cfg.headless { builder } else { builder.with_head() };
    builder
        .build()
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err))
}

async fn spawn_browser(cfg: &CdpConfig) -> Result<(Child, String), AdapterError> {
    let mut child = launch_config(cfg)?
        .launch()
        .map_err(|err| unavailable(format!("chromium did not start: {err}")))?;
    let ws_url = extract_ws_url(&mut child)
        .await
        .map_err(|err| io_error(err.to_string()))?;
    Ok((child, ws_url))
}

fn io_error(hint: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(hint)
}

fn unavailable(hint: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Unavailable).with_hint(hint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_transport_rejects_commands() {
        let transport = NoopTransport;
        transport.start().await.expect("noop start");
        assert!(transport.next_event().await.is_none());
        let err = transport
            .send_command(CommandTarget::Browser, "Target.getTargets", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Unavailable);
        assert!(err.hint.unwrap().contains("Target.getTargets"));
    }

    #[tokio::test]
    async fn unstarted_transport_has_no_events() {
        let transport = ChromiumTransport::new(CdpConfig::default());
        assert!(transport.next_event().await.is_none());
    }

    #[tokio::test]
    async fn rejects_non_websocket_endpoint_before_connecting() {
        let transport = ChromiumTransport::new(CdpConfig {
            websocket_url: Some("http://127.0.0.1:9222/json/version".into()),
            ..CdpConfig::default()
        });
        let err = transport.start().await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Unavailable);
    }
}
