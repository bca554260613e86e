use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool_opt(key: &str) -> Option<bool> {
    env_opt(key).map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    pub sender: SenderConfig,
    pub schedules: SchedulesConfig,
    /// Absolute URL origin used to mint doc and unsubscribe URLs,
    /// e.g. `https://docs.example.com`.
    pub home_url: String,
    /// Number of batched-job workers to spawn in this process.
    pub worker_count: usize,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            smtp: SmtpConfig::from_env(),
            sender: SenderConfig::from_env(),
            schedules: SchedulesConfig::from_env(),
            home_url: env_or("HOME_URL", "http://localhost:3001"),
            worker_count: env_usize("WORKER_COUNT", 2),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  server:     host={}, port={}", self.server.host, self.server.port);
        tracing::info!(
            "  smtp:       host={}, port={:?}",
            self.smtp.host.as_deref().unwrap_or("(unconfigured)"),
            self.smtp.port,
        );
        tracing::info!("  sender:     {} <{}>", self.sender.name, self.sender.email);
        tracing::info!("  home_url:   {}", self.home_url);
        tracing::info!(
            "  schedules:  doc-change={}ms/{}ms, comment={}ms/{}ms",
            self.schedules.doc_change.first_delay_ms,
            self.schedules.doc_change.throttle_ms,
            self.schedules.comment.first_delay_ms,
            self.schedules.comment.throttle_ms,
        );
        tracing::info!("  workers:    {}", self.worker_count);
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_u16("PORT", 3001),
            cors_origin: env_or("CORS_ORIGIN", "*"),
        }
    }
}

// ── SMTP ──────────────────────────────────────────────────────

/// SMTP connection settings. Credentials are read from the
/// `SMTP_USERNAME`/`SMTP_PASSWORD` environment variables at
/// transport construction, never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server hostname. `None` disables real delivery (the
    /// server falls back to a log-only transport).
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<bool>,
}

impl SmtpConfig {
    fn from_env() -> Self {
        Self {
            host: env_opt("SMTP_HOST"),
            port: env_opt("SMTP_PORT").and_then(|v| v.parse().ok()),
            tls: env_bool_opt("SMTP_TLS"),
        }
    }
}

// ── Sender identity ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    pub name: String,
    pub email: String,
    /// From address for document notifications; defaults to `email`.
    pub doc_notifications_from: Option<String>,
    /// Reply-To address for document notifications; defaults to `email`.
    pub doc_notifications_reply_to: Option<String>,
}

impl SenderConfig {
    fn from_env() -> Self {
        Self {
            name: env_or("SENDER_NAME", "Docpost"),
            email: env_or("SENDER_EMAIL", "notifications@localhost"),
            doc_notifications_from: env_opt("DOC_NOTIFICATIONS_FROM"),
            doc_notifications_reply_to: env_opt("DOC_NOTIFICATIONS_REPLY_TO"),
        }
    }

    /// Resolved From address for document notification mail.
    pub fn from_address(&self) -> &str {
        self.doc_notifications_from.as_deref().unwrap_or(&self.email)
    }

    /// Resolved Reply-To address for document notification mail.
    pub fn reply_to_address(&self) -> &str {
        self.doc_notifications_reply_to
            .as_deref()
            .unwrap_or(&self.email)
    }
}

// ── Schedules ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub first_delay_ms: u64,
    pub throttle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulesConfig {
    pub doc_change: ScheduleConfig,
    pub comment: ScheduleConfig,
}

impl SchedulesConfig {
    fn from_env() -> Self {
        Self {
            doc_change: ScheduleConfig {
                first_delay_ms: env_u64("SCHEDULE_DOC_CHANGE_FIRST_DELAY_MS", 60_000),
                throttle_ms: env_u64("SCHEDULE_DOC_CHANGE_THROTTLE_MS", 300_000),
            },
            comment: ScheduleConfig {
                first_delay_ms: env_u64("SCHEDULE_COMMENT_FIRST_DELAY_MS", 30_000),
                throttle_ms: env_u64("SCHEDULE_COMMENT_THROTTLE_MS", 180_000),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_addresses_default_to_email() {
        let sender = SenderConfig {
            name: "Docpost".to_string(),
            email: "notify@example.com".to_string(),
            doc_notifications_from: None,
            doc_notifications_reply_to: None,
        };
        assert_eq!(sender.from_address(), "notify@example.com");
        assert_eq!(sender.reply_to_address(), "notify@example.com");
    }

    #[test]
    fn sender_addresses_honor_overrides() {
        let sender = SenderConfig {
            name: "Docpost".to_string(),
            email: "notify@example.com".to_string(),
            doc_notifications_from: Some("docs@example.com".to_string()),
            doc_notifications_reply_to: Some("no-reply@example.com".to_string()),
        };
        assert_eq!(sender.from_address(), "docs@example.com");
        assert_eq!(sender.reply_to_address(), "no-reply@example.com");
    }
}
