use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("snapshot decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
