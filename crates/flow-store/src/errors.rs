use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowStoreError {
    /// Externally supplied flow JSON did not match the persisted schema.
    #[error("malformed flow import: {0}")]
    MalformedImport(String),
    #[error("flow encode failed: {0}")]
    Encode(String),
    #[error("flow file i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
