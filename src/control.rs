//! Control protocol: one request message in, one response out.

use flowtap_flow_store::FlowRecord;
use network_tap::SettingsUpdate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::SessionError;
use crate::metrics;
use crate::session::{Mode, RecordingState, SessionController};
use crate::ui_sequencer::UiEvent;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ControlMessage {
    #[serde(rename = "START_API")]
    StartNetwork,
    #[serde(rename = "STOP_API")]
    StopNetwork,
    #[serde(rename = "GET_API_FLOW")]
    GetNetworkFlow,
    #[serde(rename = "START_UI", alias = "START_FE")]
    StartUi,
    #[serde(rename = "STOP_UI", alias = "STOP_FE")]
    StopUi,
    #[serde(rename = "GET_UI_FLOW", alias = "GET_FE_FLOW")]
    GetUiFlow,
    #[serde(rename = "GET_STATE", alias = "GET_RECORDING_STATE")]
    GetState,
    #[serde(rename = "UPDATE_SETTINGS")]
    UpdateSettings(SettingsUpdate),
    /// A UI action reported by an external instrumentation layer.
    #[serde(rename = "UI_EVENT", alias = "FE_EVENT")]
    UiEvent(UiEvent),
}

impl ControlMessage {
    pub fn action(&self) -> &'static str {
        match self {
            ControlMessage::StartNetwork => "START_API",
            ControlMessage::StopNetwork => "STOP_API",
            ControlMessage::GetNetworkFlow => "GET_API_FLOW",
            ControlMessage::StartUi => "START_UI",
            ControlMessage::StopUi => "STOP_UI",
            ControlMessage::GetUiFlow => "GET_UI_FLOW",
            ControlMessage::GetState => "GET_STATE",
            ControlMessage::UpdateSettings(_) => "UPDATE_SETTINGS",
            ControlMessage::UiEvent(_) => "UI_EVENT",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Ack { ok: bool },
    NetworkFlow { entries: Vec<FlowRecord> },
    UiFlow { entries: Vec<FlowRecord> },
    State(RecordingState),
    Error { ok: bool, message: String },
}

impl ControlResponse {
    pub fn ack() -> Self {
        ControlResponse::Ack { ok: true }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ControlResponse::Error {
            ok: false,
            message: message.into(),
        }
    }
}

/// Apply one control message to the session.
pub async fn dispatch(
    controller: &SessionController,
    message: ControlMessage,
) -> Result<ControlResponse, SessionError> {
    let action = message.action();
    debug!(target: "flowtap::server", action, "control message");
    let result = match message {
        ControlMessage::StartNetwork => controller
            .start(Mode::Network)
            .await
            .map(|()| ControlResponse::ack()),
        ControlMessage::StopNetwork => {
            controller.stop(Mode::Network).await;
            Ok(ControlResponse::ack())
        }
        ControlMessage::GetNetworkFlow => Ok(ControlResponse::NetworkFlow {
            entries: tagged(controller.network_entries()),
        }),
        ControlMessage::StartUi => controller
            .start(Mode::Ui)
            .await
            .map(|()| ControlResponse::ack()),
        ControlMessage::StopUi => {
            controller.stop(Mode::Ui).await;
            Ok(ControlResponse::ack())
        }
        ControlMessage::GetUiFlow => Ok(ControlResponse::UiFlow {
            entries: tagged(controller.ui_entries()),
        }),
        ControlMessage::GetState => Ok(ControlResponse::State(controller.state())),
        ControlMessage::UpdateSettings(update) => {
            controller.update_settings(&update);
            Ok(ControlResponse::ack())
        }
        ControlMessage::UiEvent(event) => {
            if !controller.on_ui_event(event).await {
                debug!(target: "flowtap::server", "ui event ignored; ui recording inactive");
            }
            Ok(ControlResponse::ack())
        }
    };
    metrics::record_control(action, result.is_ok());
    result
}

fn tagged<R: Into<FlowRecord>>(records: Vec<R>) -> Vec<FlowRecord> {
    records.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_legacy_action_names() {
        let message: ControlMessage = serde_json::from_value(json!({"action": "START_FE"})).unwrap();
        assert_eq!(message, ControlMessage::StartUi);
        let message: ControlMessage =
            serde_json::from_value(json!({"action": "GET_RECORDING_STATE"})).unwrap();
        assert_eq!(message, ControlMessage::GetState);
    }

    #[test]
    fn ui_event_fields_are_flat() {
        let message: ControlMessage = serde_json::from_value(json!({
            "action": "FE_EVENT",
            "event": "CLICK",
            "element": "BUTTON",
            "text": null,
            "route": "https://a/",
            "scrollY": 120
        }))
        .unwrap();
        match message {
            ControlMessage::UiEvent(event) => {
                assert_eq!(event.event, "CLICK");
                assert_eq!(event.text, "");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn settings_update_is_partial() {
        let message: ControlMessage = serde_json::from_value(json!({
            "action": "UPDATE_SETTINGS",
            "captureUiScreenshots": false
        }))
        .unwrap();
        match message {
            ControlMessage::UpdateSettings(update) => {
                assert_eq!(update.capture_ui_screenshots, Some(false));
                assert_eq!(update.include_request_headers, None);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(serde_json::from_value::<ControlMessage>(json!({"action": "PAUSE"})).is_err());
    }

    #[test]
    fn responses_serialize_to_wire_shapes() {
        let state = ControlResponse::State(RecordingState {
            network_active: true,
            ui_active: false,
        });
        assert_eq!(
            serde_json::to_value(state).unwrap(),
            json!({"networkActive": true, "uiActive": false})
        );
        assert_eq!(
            serde_json::to_value(ControlResponse::NetworkFlow { entries: vec![] }).unwrap(),
            json!({"entries": []})
        );
        assert_eq!(
            serde_json::to_value(ControlResponse::error("busy")).unwrap(),
            json!({"ok": false, "message": "busy"})
        );
    }
}
