use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header map as delivered by the inspection protocol.
pub type Headers = serde_json::Map<String, serde_json::Value>;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Records that carry a per-flow step number.
pub trait Stepped {
    fn step(&self) -> u64;
}

/// PNG capture stored as a data URL so the viewer can render it directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Screenshot(String);

impl Screenshot {
    /// Wrap base64 PNG data as returned by the capture command.
    pub fn from_png_base64(data: &str) -> Self {
        Self(format!("{PNG_DATA_URL_PREFIX}{data}"))
    }

    pub fn from_png_bytes(bytes: &[u8]) -> Self {
        Self::from_png_base64(&STANDARD.encode(bytes))
    }

    pub fn data_url(&self) -> &str {
        &self.0
    }

    pub fn decode_png(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let payload = self
            .0
            .strip_prefix(PNG_DATA_URL_PREFIX)
            .unwrap_or(self.0.as_str());
        STANDARD.decode(payload)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    #[default]
    Text,
    Base64,
}

impl BodyEncoding {
    pub fn from_base64_flag(base64_encoded: bool) -> Self {
        if base64_encoded {
            Self::Base64
        } else {
            Self::Text
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A finalized request/response exchange. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub step: u64,
    pub request: RequestMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub body_encoding: BodyEncoding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Screenshot>,
}

impl NetworkRecord {
    pub fn status(&self) -> Option<i64> {
        self.response.as_ref().map(|response| response.status)
    }

    pub fn is_failure(&self) -> bool {
        self.status().map(|status| status >= 400).unwrap_or(false)
    }
}

impl Stepped for NetworkRecord {
    fn step(&self) -> u64 {
        self.step
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialScreenRecord {
    pub step: u64,
    pub route: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Screenshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiStepRecord {
    pub step: u64,
    /// Page-side classification, e.g. `CLICK` or `ROUTE_CHANGE`.
    pub event: String,
    #[serde(default)]
    pub element: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub route: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Screenshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiRecord {
    #[serde(rename = "INITIAL_SCREEN")]
    InitialScreen(InitialScreenRecord),
    #[serde(rename = "FE_STEP")]
    Step(UiStepRecord),
}

impl Stepped for UiRecord {
    fn step(&self) -> u64 {
        match self {
            UiRecord::InitialScreen(record) => record.step,
            UiRecord::Step(record) => record.step,
        }
    }
}

/// Persisted record shape shared by both flows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FlowRecord {
    #[serde(rename = "API")]
    Network(NetworkRecord),
    #[serde(rename = "INITIAL_SCREEN")]
    InitialScreen(InitialScreenRecord),
    #[serde(rename = "FE_STEP")]
    UiStep(UiStepRecord),
}

impl FlowRecord {
    pub fn as_network(&self) -> Option<&NetworkRecord> {
        match self {
            FlowRecord::Network(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_ui(&self) -> bool {
        !matches!(self, FlowRecord::Network(_))
    }
}

impl Stepped for FlowRecord {
    fn step(&self) -> u64 {
        match self {
            FlowRecord::Network(record) => record.step,
            FlowRecord::InitialScreen(record) => record.step,
            FlowRecord::UiStep(record) => record.step,
        }
    }
}

impl From<NetworkRecord> for FlowRecord {
    fn from(record: NetworkRecord) -> Self {
        FlowRecord::Network(record)
    }
}

impl From<UiRecord> for FlowRecord {
    fn from(record: UiRecord) -> Self {
        match record {
            UiRecord::InitialScreen(record) => FlowRecord::InitialScreen(record),
            UiRecord::Step(record) => FlowRecord::UiStep(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_network() -> NetworkRecord {
        NetworkRecord {
            step: 3,
            request: RequestMeta {
                url: "https://api.example.com/items".into(),
                method: "GET".into(),
                post_data: None,
                headers: None,
            },
            page_url: Some("https://example.com/".into()),
            response: Some(ResponseMeta {
                status: 404,
                headers: None,
                mime_type: Some("application/json".into()),
            }),
            body: Some("{}".into()),
            body_encoding: BodyEncoding::Text,
            error_text: None,
            duration_ms: 12,
            timestamp: Utc::now(),
            screenshot: None,
        }
    }

    #[test]
    fn network_record_uses_viewer_field_names() {
        let value = serde_json::to_value(FlowRecord::from(sample_network())).unwrap();
        assert_eq!(value["type"], "API");
        assert_eq!(value["step"], 3);
        assert_eq!(value["request"]["method"], "GET");
        assert_eq!(value["response"]["mimeType"], "application/json");
        assert_eq!(value["bodyEncoding"], "text");
        assert_eq!(value["durationMs"], 12);
        assert!(value.get("screenshot").is_none());
        assert!(value.get("errorText").is_none());
    }

    #[test]
    fn ui_records_are_tagged_by_kind() {
        let initial = UiRecord::InitialScreen(InitialScreenRecord {
            step: 1,
            route: "https://example.com/".into(),
            timestamp: Utc::now(),
            screenshot: None,
        });
        let value = serde_json::to_value(&initial).unwrap();
        assert_eq!(value["type"], "INITIAL_SCREEN");

        let parsed: UiRecord = serde_json::from_value(json!({
            "type": "FE_STEP",
            "step": 2,
            "event": "CLICK",
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        match parsed {
            UiRecord::Step(step) => {
                assert_eq!(step.event, "CLICK");
                assert!(step.element.is_empty());
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn failure_is_status_400_and_above() {
        let mut record = sample_network();
        assert!(record.is_failure());
        record.response = None;
        assert!(!record.is_failure());
    }

    #[test]
    fn screenshot_decodes_back_to_png_bytes() {
        let shot = Screenshot::from_png_bytes(&[0x89, b'P', b'N', b'G']);
        assert!(shot.data_url().starts_with("data:image/png;base64,"));
        assert_eq!(shot.decode_png().unwrap(), vec![0x89, b'P', b'N', b'G']);
    }
}
