//! SMTP mail transport via `lettre` with TLS support.
//!
//! Delivers rendered envelopes through an SMTP server. Supports
//! STARTTLS and implicit TLS connections.

use async_trait::async_trait;
use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use docpost_core::config::SmtpConfig;

use crate::traits::{MailEnvelope, Mailer, NotifyError};

/// The one extra header this pipeline emits on every notification.
#[derive(Debug, Clone)]
struct ListUnsubscribe(String);

impl Header for ListUnsubscribe {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("List-Unsubscribe")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Sends envelopes via SMTP.
#[derive(Debug)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpMailer {
    /// Build an `SmtpMailer` from SMTP configuration.
    ///
    /// Port defaults to 587. Port 465 always uses implicit TLS;
    /// other ports use STARTTLS unless `tls` is `Some(false)`.
    ///
    /// Credentials are resolved from the `SMTP_USERNAME` and
    /// `SMTP_PASSWORD` environment variables. If both are set they are
    /// passed to the transport; otherwise the connection is
    /// unauthenticated.
    pub fn from_config(cfg: &SmtpConfig) -> Result<Self, NotifyError> {
        let host = cfg
            .host
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP_HOST is not set".to_string()))?;
        let port = cfg.port.unwrap_or(587);
        let use_tls = cfg.tls.unwrap_or(true);

        let mut builder = if port == 465 || use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            host: host.to_string(),
        })
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, NotifyError> {
    addr.parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, envelope: &MailEnvelope) -> Result<(), NotifyError> {
        if envelope.to.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let mut builder = Message::builder().from(parse_mailbox(&envelope.from)?);
        if let Some(reply_to) = &envelope.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }
        for recipient in &envelope.to {
            builder = builder.to(parse_mailbox(recipient)?);
        }
        for (name, value) in &envelope.headers {
            if name.eq_ignore_ascii_case("List-Unsubscribe") {
                builder = builder.header(ListUnsubscribe(value.clone()));
            } else {
                tracing::debug!(header = %name, "header not supported by smtp transport; skipped");
            }
        }

        let message = builder
            .subject(&envelope.subject)
            .multipart(MultiPart::alternative_plain_html(
                envelope.text.clone(),
                envelope.html.clone(),
            ))
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            transport = "smtp",
            host = %self.host,
            to = ?envelope.to,
            subject = %envelope.subject,
            "notification delivered"
        );
        Ok(())
    }

    fn transport_name(&self) -> &str {
        "smtp"
    }
}
