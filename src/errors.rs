//! Error types for the recorder.

use cdp_adapter::AdapterError;
use flowtap_flow_store::FlowStoreError;
use thiserror::Error;

/// Failures surfaced by session start.
///
/// Every variant is an attach failure from the caller's point of view: the mode stays idle and no
/// partial state is kept.
#[derive(Clone, Debug, Error)]
pub enum SessionError {
    #[error("no target to record: {0}")]
    NoTarget(AdapterError),
    #[error("another recording mode is attaching")]
    AttachInProgress,
    #[error("failed to attach to target: {0}")]
    Attach(AdapterError),
    #[error("failed to enable the inspection channel: {0}")]
    Channel(AdapterError),
    #[error("target was lost while recording was starting")]
    TargetLost,
    #[error("inspection channel closed; restart to reconnect")]
    ChannelClosed,
}

#[derive(Debug, Error)]
pub enum FlowTapError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] FlowStoreError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FlowTapResult<T> = Result<T, FlowTapError>;
