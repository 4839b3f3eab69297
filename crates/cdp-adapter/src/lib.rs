//! FlowTap CDP adapter.
//!
//! Binds the inspection protocol the recorder depends on to the Chromium DevTools Protocol: a
//! transport that moves raw commands and notifications over the DevTools websocket, an
//! [`Inspector`] channel exposing the handful of operations the recorder needs, decoding of the
//! notifications it consumes, and a best-effort [`ScreenshotService`].

use std::{env, path::PathBuf};

use which::which;

pub mod ids {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    /// Identifier of a browser target (tab/page) as reported by `Target.getTargets`.
    #[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct TargetId(pub String);

    /// Flattened CDP session attached to a single target.
    #[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct CdpSessionId(pub String);

    /// Opaque id correlating the notifications that belong to one network request.
    #[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct RequestId(pub String);

    impl fmt::Display for TargetId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl fmt::Display for CdpSessionId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl fmt::Display for RequestId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl From<&str> for RequestId {
        fn from(value: &str) -> Self {
            Self(value.to_string())
        }
    }
}

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("cdp command timed out")]
        Timeout,
        #[error("target not found")]
        TargetNotFound,
        #[error("unexpected protocol payload")]
        Protocol,
        #[error("transport unavailable")]
        Unavailable,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn protocol(err: impl fmt::Display) -> Self {
            Self::new(AdapterErrorKind::Protocol).with_hint(err.to_string())
        }
    }
}

pub mod config {
    use crate::detect_chrome_executable;
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    /// Configuration for reaching (or launching) the browser being recorded.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        /// DevTools websocket of an already running browser. Takes precedence over launching.
        pub websocket_url: Option<String>,
        pub executable: Option<PathBuf>,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        pub default_deadline_ms: u64,
        /// Pin recording to this target. Without it the first listed page target is used,
        /// which need not be the tab that has focus.
        pub target_id: Option<String>,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                websocket_url: None,
                executable: None,
                user_data_dir: PathBuf::from("./.flowtap-profile"),
                headless: false,
                default_deadline_ms: 30_000,
                target_id: None,
            }
        }
    }

    impl CdpConfig {
        /// Executable to launch: the configured one, else whatever is detected on the host.
        pub fn resolve_executable(&self) -> Option<PathBuf> {
            self.executable
                .clone()
                .filter(|path| !path.as_os_str().is_empty())
                .or_else(detect_chrome_executable)
        }

        pub fn can_connect(&self) -> bool {
            self.websocket_url.is_some() || self.resolve_executable().is_some()
        }
    }
}

pub mod events;
pub mod inspector;
pub mod metrics;
pub mod screenshot;
pub mod transport;
pub mod util;

pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use events::{
    Headers, HeadersReceived, InspectorEvent, InspectorPayload, PageSignal, RequestFailed,
    RequestFinished, RequestStarted, TargetLost,
};
pub use ids::{CdpSessionId, RequestId, TargetId};
pub use inspector::{CdpInspector, Inspector, ResponseBody, ScriptHandle, TargetInfo};
pub use metrics::AdapterMetricsSnapshot;
pub use screenshot::ScreenshotService;
pub use transport::{ChromiumTransport, CdpTransport, CommandTarget, NoopTransport, TransportEvent};

fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("FLOWTAP_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    chrome_executable_names()
        .iter()
        .find_map(|name| which(name).ok())
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}
