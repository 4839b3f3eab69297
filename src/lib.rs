//! FlowTap library
//!
//! Session controller, UI sequencing, control protocol and configuration behind the `flowtap`
//! binary. Exposed for integration testing.

pub mod config;
pub mod control;
pub mod errors;
pub mod inspect;
pub mod instrumentation;
pub mod metrics;
pub mod server;
pub mod session;
pub mod ui_sequencer;

pub use config::RecorderConfig;
pub use control::{dispatch, ControlMessage, ControlResponse};
pub use errors::{FlowTapError, FlowTapResult, SessionError};
pub use inspect::{FlowFilter, FlowSummary};
pub use session::{Mode, RecordingState, SessionController};
pub use ui_sequencer::{UiEvent, UiEventSequencer};
