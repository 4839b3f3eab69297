//! Recording session controller.
//!
//! Owns the single attachment to the browser target and the Idle/Recording state of both
//! recording modes. Both modes share the attachment: it is created by the first start and
//! released once both modes are idle again. Starts and stops are serialized; notification
//! handling runs beside them and only consults the state.

use std::fmt;
use std::sync::Arc;

use cdp_adapter::{
    CdpSessionId, Inspector, InspectorEvent, InspectorPayload, PageSignal, ScreenshotService,
    ScriptHandle, TargetId, TargetLost,
};
use flowtap_flow_store::{NetworkFlow, NetworkRecord, UiFlow, UiRecord};
use network_tap::{CaptureSettings, CdpTapPort, RequestCorrelator, SettingsHandle, SettingsUpdate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::SessionError;
use crate::instrumentation::{decode_page_signal, BINDING_NAME, PAGE_SCRIPT, TEARDOWN_SCRIPT};
use crate::metrics;
use crate::ui_sequencer::{UiEvent, UiEventSequencer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Network,
    Ui,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Network => "network",
            Mode::Ui => "ui",
        }
    }

    fn other(self) -> Mode {
        match self {
            Mode::Network => Mode::Ui,
            Mode::Ui => Mode::Network,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ModeState {
    Idle,
    Recording,
}

/// Recording flags of both modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingState {
    pub network_active: bool,
    pub ui_active: bool,
}

#[derive(Clone, Debug)]
struct Attachment {
    target: TargetId,
    session: CdpSessionId,
    url: String,
}

struct ControllerState {
    network: ModeState,
    ui: ModeState,
    /// Mode whose start currently holds the attach sequence.
    starting: Option<Mode>,
    attachment: Option<Attachment>,
    instrumentation: Option<ScriptHandle>,
    ui_generation: u64,
    /// Set once the inspection channel has closed; no mode can start afterwards.
    channel_closed: bool,
    /// Bumped whenever the attachment is lost; a start that observes a different epoch aborts.
    epoch: u64,
}

impl ControllerState {
    fn mode(&self, mode: Mode) -> ModeState {
        match mode {
            Mode::Network => self.network,
            Mode::Ui => self.ui,
        }
    }

    fn set_mode(&mut self, mode: Mode, value: ModeState) {
        match mode {
            Mode::Network => self.network = value,
            Mode::Ui => self.ui = value,
        }
    }

    fn all_idle(&self) -> bool {
        self.network == ModeState::Idle && self.ui == ModeState::Idle
    }

    fn owns(&self, lost: &TargetLost) -> bool {
        match &self.attachment {
            Some(attachment) => {
                lost.target_id.as_ref() == Some(&attachment.target)
                    || lost.session_id.as_ref() == Some(&attachment.session)
            }
            None => false,
        }
    }
}

enum Route {
    Network,
    Ui,
}

struct StartingGuard<'a> {
    state: &'a Mutex<ControllerState>,
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().starting = None;
    }
}

pub struct SessionController {
    inspector: Arc<dyn Inspector>,
    screenshots: ScreenshotService,
    settings: SettingsHandle,
    correlator: RequestCorrelator,
    sequencer: UiEventSequencer,
    state: Mutex<ControllerState>,
    ops: tokio::sync::Mutex<()>,
    /// Held by one UI event from receipt to append. The lock is FIFO, so steps follow receipt
    /// order even when captures finish out of order.
    ui_lane: tokio::sync::Mutex<()>,
}

impl SessionController {
    pub fn new(inspector: Arc<dyn Inspector>, settings: CaptureSettings) -> Self {
        let settings = SettingsHandle::new(settings);
        Self {
            screenshots: ScreenshotService::new(Arc::clone(&inspector)),
            correlator: RequestCorrelator::new(Arc::new(NetworkFlow::new()), settings.clone()),
            sequencer: UiEventSequencer::new(Arc::new(UiFlow::new())),
            settings,
            inspector,
            state: Mutex::new(ControllerState {
                network: ModeState::Idle,
                ui: ModeState::Idle,
                starting: None,
                attachment: None,
                instrumentation: None,
                ui_generation: 0,
                channel_closed: false,
                epoch: 0,
            }),
            ops: tokio::sync::Mutex::new(()),
            ui_lane: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> RecordingState {
        let state = self.state.lock();
        RecordingState {
            network_active: state.network == ModeState::Recording,
            ui_active: state.ui == ModeState::Recording,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attachment.is_some()
    }

    /// Whether the inspection channel has gone away for good.
    pub fn is_channel_closed(&self) -> bool {
        self.state.lock().channel_closed
    }

    pub fn network_flow(&self) -> &Arc<NetworkFlow> {
        self.correlator.flow()
    }

    pub fn ui_flow(&self) -> &Arc<UiFlow> {
        self.sequencer.flow()
    }

    pub fn network_entries(&self) -> Vec<NetworkRecord> {
        self.correlator.flow().snapshot()
    }

    pub fn ui_entries(&self) -> Vec<UiRecord> {
        self.sequencer.flow().snapshot()
    }

    pub fn settings(&self) -> CaptureSettings {
        self.settings.current()
    }

    pub fn update_settings(&self, update: &SettingsUpdate) -> CaptureSettings {
        let settings = self.settings.update(update);
        info!(target: "flowtap::session", ?settings, "capture settings updated");
        settings
    }

    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_len()
    }

    /// Wait for every network finalization spawned so far.
    pub async fn settle(&self) {
        self.correlator.settle().await;
    }

    /// Start recording `mode`. A no-op when the mode is already recording or already starting.
    ///
    /// On failure the mode stays idle and an attachment created by this call is released.
    pub async fn start(&self, mode: Mode) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock();
            if state.channel_closed {
                return Err(SessionError::ChannelClosed);
            }
            if state.mode(mode) == ModeState::Recording {
                return Ok(());
            }
            match state.starting {
                Some(current) if current == mode => return Ok(()),
                Some(_) => return Err(SessionError::AttachInProgress),
                None => state.starting = Some(mode),
            }
        }
        let _starting = StartingGuard { state: &self.state };
        let _ops = self.ops.lock().await;

        let recording = self.state.lock().mode(mode) == ModeState::Recording;
        if recording {
            return Ok(());
        }

        let result = match self.ensure_attached().await {
            Ok((attachment, epoch)) => match mode {
                Mode::Network => self.start_network(&attachment, epoch).await,
                Mode::Ui => self.start_ui(&attachment, epoch).await,
            },
            Err(err) => Err(err),
        };
        match &result {
            Ok(()) => info!(target: "flowtap::session", %mode, "recording started"),
            Err(err) => {
                warn!(target: "flowtap::session", %mode, %err, "recording failed to start");
                self.detach_if_idle().await;
            }
        }
        result
    }

    /// Stop recording `mode`. Always effective; channel errors are logged.
    pub async fn stop(&self, mode: Mode) {
        let _ops = self.ops.lock().await;
        let (session, instrumentation) = {
            let mut state = self.state.lock();
            if state.mode(mode) == ModeState::Idle {
                return;
            }
            state.set_mode(mode, ModeState::Idle);
            let session = state
                .attachment
                .as_ref()
                .map(|attachment| attachment.session.clone());
            let instrumentation = match mode {
                Mode::Ui => state.instrumentation.take(),
                Mode::Network => None,
            };
            (session, instrumentation)
        };

        match mode {
            Mode::Network => {
                let abandoned = self.correlator.end();
                if let Some(session) = &session {
                    if let Err(err) = self.inspector.disable_network(session).await {
                        warn!(target: "flowtap::session", %err, "failed to disable network domain");
                    }
                }
                info!(target: "flowtap::session", %mode, abandoned, "recording stopped");
            }
            Mode::Ui => {
                if let (Some(session), Some(handle)) = (&session, &instrumentation) {
                    if let Err(err) = self
                        .inspector
                        .remove_instrumentation(session, BINDING_NAME, handle, TEARDOWN_SCRIPT)
                        .await
                    {
                        warn!(target: "flowtap::session", %err, "failed to remove page instrumentation");
                    }
                }
                info!(target: "flowtap::session", %mode, "recording stopped");
            }
        }
        self.detach_if_idle().await;
    }

    /// Stop both modes and wait for in-flight finalizations.
    pub async fn shutdown(&self) {
        self.stop(Mode::Network).await;
        self.stop(Mode::Ui).await;
        self.correlator.settle().await;
    }

    /// Feed one decoded notification from the inspection channel.
    pub async fn handle_event(&self, event: InspectorEvent) {
        let InspectorEvent {
            session_id,
            payload,
        } = event;
        if let InspectorPayload::TargetLost(lost) = &payload {
            self.on_target_lost(lost);
            return;
        }

        let route = {
            let state = self.state.lock();
            let Some(attachment) = state.attachment.as_ref() else {
                return;
            };
            if session_id.as_ref() != Some(&attachment.session) {
                trace!(target: "flowtap::session", session = ?session_id, "notification for another session");
                return;
            }
            match &payload {
                InspectorPayload::PageSignal(_) if state.ui == ModeState::Recording => Route::Ui,
                InspectorPayload::PageSignal(_) => return,
                _ if state.network == ModeState::Recording => Route::Network,
                _ => return,
            }
        };

        match (route, payload) {
            (Route::Ui, InspectorPayload::PageSignal(signal)) => self.on_page_signal(signal).await,
            (Route::Network, payload) => self.correlator.ingest(payload),
            _ => {}
        }
    }

    /// Record one classified UI action. Returns whether it was appended.
    ///
    /// Events are appended in the order they arrive here. An event whose screenshot is still
    /// being captured when UI recording stops is dropped.
    pub async fn on_ui_event(&self, event: UiEvent) -> bool {
        let _lane = self.ui_lane.lock().await;
        let (generation, session) = {
            let state = self.state.lock();
            if state.ui != ModeState::Recording {
                return false;
            }
            let session = state
                .attachment
                .as_ref()
                .map(|attachment| attachment.session.clone());
            (state.ui_generation, session)
        };

        let screenshot = match session {
            Some(session) if self.settings.current().capture_ui_screenshots => {
                self.screenshots.capture(&session).await
            }
            _ => None,
        };

        let state = self.state.lock();
        if state.ui != ModeState::Recording || state.ui_generation != generation {
            debug!(target: "flowtap::session", event = %event.event, "ui recording stopped during capture; event dropped");
            return false;
        }
        self.sequencer
            .record(generation, event, screenshot)
            .is_some()
    }

    /// Pump inspection notifications into the controller until cancelled or the channel closes.
    pub fn spawn_event_pump(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = controller.inspector.next_event() => match event {
                        Some(event) => controller.handle_event(event).await,
                        None => {
                            controller.close_channel();
                            break;
                        }
                    },
                }
            }
            debug!(target: "flowtap::session", "event pump stopped");
        })
    }

    async fn ensure_attached(&self) -> Result<(Attachment, u64), SessionError> {
        let current = {
            let state = self.state.lock();
            state
                .attachment
                .clone()
                .map(|attachment| (attachment, state.epoch))
        };
        if let Some(current) = current {
            return Ok(current);
        }

        let target = self
            .inspector
            .active_target()
            .await
            .map_err(SessionError::NoTarget)?;
        let session = self
            .inspector
            .attach(&target.target_id)
            .await
            .map_err(SessionError::Attach)?;
        let attachment = Attachment {
            target: target.target_id,
            session,
            url: target.url,
        };
        info!(
            target: "flowtap::session",
            target_id = %attachment.target,
            session = %attachment.session,
            url = %attachment.url,
            "attached to target"
        );

        let mut state = self.state.lock();
        state.attachment = Some(attachment.clone());
        Ok((attachment, state.epoch))
    }

    async fn start_network(&self, attachment: &Attachment, epoch: u64) -> Result<(), SessionError> {
        self.inspector
            .enable_network(&attachment.session)
            .await
            .map_err(SessionError::Channel)?;

        let mut state = self.state.lock();
        if state.epoch != epoch {
            return Err(SessionError::TargetLost);
        }
        let port = Arc::new(CdpTapPort::new(
            Arc::clone(&self.inspector),
            attachment.session.clone(),
        ));
        let generation = self.correlator.begin(port);
        state.network = ModeState::Recording;
        debug!(target: "flowtap::session", generation, "network flow reset");
        Ok(())
    }

    async fn start_ui(&self, attachment: &Attachment, epoch: u64) -> Result<(), SessionError> {
        let handle = self
            .inspector
            .install_instrumentation(&attachment.session, BINDING_NAME, PAGE_SCRIPT)
            .await
            .map_err(SessionError::Channel)?;
        let screenshot = self.screenshots.capture(&attachment.session).await;

        let mut state = self.state.lock();
        if state.epoch != epoch {
            return Err(SessionError::TargetLost);
        }
        state.ui_generation = self.sequencer.begin(attachment.url.clone(), screenshot);
        state.instrumentation = Some(handle);
        state.ui = ModeState::Recording;
        Ok(())
    }

    async fn detach_if_idle(&self) {
        let attachment = {
            let mut state = self.state.lock();
            if !state.all_idle() {
                return;
            }
            state.instrumentation = None;
            state.attachment.take()
        };
        let Some(attachment) = attachment else {
            return;
        };
        match self.inspector.detach(&attachment.session).await {
            Ok(()) => info!(target: "flowtap::session", target_id = %attachment.target, "detached from target"),
            Err(err) => warn!(target: "flowtap::session", target_id = %attachment.target, %err, "detach failed"),
        }
    }

    async fn on_page_signal(&self, signal: PageSignal) {
        if signal.binding != BINDING_NAME {
            trace!(target: "flowtap::session", binding = %signal.binding, "unrelated binding call");
            return;
        }
        match decode_page_signal(&signal.payload) {
            Ok(event) => {
                self.on_ui_event(event).await;
            }
            Err(err) => {
                warn!(target: "flowtap::session", %err, "malformed page signal dropped");
            }
        }
    }

    fn close_channel(&self) {
        self.state.lock().channel_closed = true;
        self.release("inspection channel closed");
    }

    fn on_target_lost(&self, lost: &TargetLost) {
        if !self.state.lock().owns(lost) {
            trace!(target: "flowtap::session", ?lost, "loss of an unattached target");
            return;
        }
        self.release(&lost.reason);
    }

    /// Force both modes idle and forget the attachment without talking to the target.
    fn release(&self, reason: &str) {
        let (attachment, was_recording) = {
            let mut state = self.state.lock();
            let was_recording = !state.all_idle();
            state.network = ModeState::Idle;
            state.ui = ModeState::Idle;
            state.instrumentation = None;
            state.epoch += 1;
            (state.attachment.take(), was_recording)
        };
        let abandoned = self.correlator.end();
        if attachment.is_none() && !was_recording {
            return;
        }
        metrics::record_target_loss();
        warn!(
            target: "flowtap::session",
            target_id = ?attachment.map(|attachment| attachment.target),
            %reason,
            abandoned,
            "target lost; recording stopped"
        );
    }
}
