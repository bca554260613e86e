//! Mail transport capability and shared error types.

use async_trait::async_trait;
use tokio::sync::Mutex;

use docpost_core::DocpostError;

/// Errors that can occur while rendering or delivering mail.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<NotifyError> for DocpostError {
    fn from(e: NotifyError) -> Self {
        match e {
            NotifyError::Smtp(msg) => DocpostError::Transient(msg),
            NotifyError::Template(msg) | NotifyError::Config(msg) => DocpostError::Render(msg),
        }
    }
}

/// A fully rendered email ready for a transport.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MailEnvelope {
    pub from: String,
    pub reply_to: Option<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
    /// Extra headers (name, value). Transports apply the ones they
    /// know how to express; unknown names are logged and skipped.
    pub headers: Vec<(String, String)>,
}

/// Single-operation mail transport capability.
///
/// Implementations for different transports are independent structs;
/// which one runs is a startup-time configuration choice.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, envelope: &MailEnvelope) -> Result<(), NotifyError>;

    /// Human-readable name for this transport (e.g., "smtp", "log").
    fn transport_name(&self) -> &str;
}

/// Transport that logs envelopes instead of delivering them.
///
/// Used when SMTP is unconfigured and by tests, which inspect the
/// captured envelopes through [`LogMailer::sent`].
#[derive(Default)]
pub struct LogMailer {
    sent: Mutex<Vec<MailEnvelope>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes accepted so far, in send order.
    pub async fn sent(&self) -> Vec<MailEnvelope> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, envelope: &MailEnvelope) -> Result<(), NotifyError> {
        tracing::info!(
            transport = "log",
            to = ?envelope.to,
            subject = %envelope.subject,
            "mail captured (delivery disabled)"
        );
        self.sent.lock().await.push(envelope.clone());
        Ok(())
    }

    fn transport_name(&self) -> &str {
        "log"
    }
}
