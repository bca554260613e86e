use thiserror::Error;

/// Error kinds shared across the notification pipeline.
///
/// HTTP handlers map `InvalidInput`/`NotAuthorized`/`NotFound` to
/// 400/403/404. `Transient` and `Render` are job failures that the
/// engine retries; token errors surface as a friendly unsubscribe
/// page, never as an HTTP error status.
#[derive(Error, Debug)]
pub enum DocpostError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient infrastructure error: {0}")]
    Transient(String),

    #[error("render failure: {0}")]
    Render(String),

    #[error("unsubscribe token expired")]
    ExpiredToken,

    #[error("bad unsubscribe token signature")]
    BadSignature,
}

impl DocpostError {
    /// Whether a retry can reasonably succeed without operator action.
    pub fn is_retriable(&self) -> bool {
        matches!(self, DocpostError::Transient(_) | DocpostError::Render(_))
    }
}
