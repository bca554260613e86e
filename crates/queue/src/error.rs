//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(String),

    #[error("envelope encode error: {0}")]
    Encode(String),

    #[error("handler already installed")]
    HandlerInstalled,

    #[error("no handler installed")]
    NoHandler,

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("handler deadline exceeded after {0}ms")]
    Deadline(u64),
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Encode(e.to_string())
    }
}
