//! Document notification pipeline.
//!
//! This crate provides:
//! - `NotificationDecider` mapping edit bundles to batched payloads
//! - `EmailRenderer` turning a drained batch into a mail envelope
//! - HMAC-signed unsubscribe tokens with self-service validation
//! - The preference model (document defaults + per-user overrides)
//! - `Mailer` trait with SMTP and log-only transports
//! - Minijinja template rendering for subjects, bodies, and pages

pub mod decider;
pub mod directory;
pub mod memory;
pub mod payload;
pub mod prefs;
pub mod render;
pub mod smtp;
pub mod templates;
pub mod token;
pub mod traits;

pub use decider::{EditBundle, NotificationDecider};
pub use directory::{AccessView, BundleComment, DirectTables, Directory, DocInfo, Subscriber, UserKind, UserProfile};
pub use memory::{MemoryAccessView, MemoryDirectory};
pub use payload::{CommentPayload, DocChangePayload};
pub use prefs::{overlay, CommentsPref, DocPrefs, EffectivePrefs, PrefsBundle, PrefsPatch};
pub use render::EmailRenderer;
pub use smtp::SmtpMailer;
pub use templates::TemplateRenderer;
pub use traits::{LogMailer, MailEnvelope, Mailer, NotifyError};
