//! Email renderer: the batch handler behind the engine.
//!
//! Parses the batch key back apart, loads document and recipient,
//! mints unsubscribe links, and renders one mail per drained batch.
//! Corrupt payloads and vanished documents/recipients are dropped with
//! a log line; render and transport failures fail the job so the
//! engine retries the batch on its next fire.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use docpost_core::config::SenderConfig;
use docpost_core::{parse_batch_key, Category, DocpostError, UserId};
use docpost_queue::{BatchHandler, Payload};

use crate::directory::{Directory, DocInfo, UserProfile};
use crate::payload::{decode, CommentPayload, DocChangePayload};
use crate::templates::TemplateRenderer;
use crate::token::{self, UnsubscribeEvent, UnsubscribeMode};
use crate::traits::{MailEnvelope, Mailer};

#[derive(Serialize)]
struct AuthorChangesCtx {
    user: String,
    tables: Vec<String>,
    /// First two table names, pre-joined for the templates.
    tables_preview: String,
    categories: Vec<String>,
    extra_tables_count: usize,
}

#[derive(Serialize)]
struct DocChangeCtx<'a> {
    doc_name: &'a str,
    doc_url: &'a str,
    unsubscribe_url: &'a str,
    /// Set only when the whole batch has exactly one author.
    sender_author_name: Option<String>,
    authors: Vec<AuthorChangesCtx>,
}

#[derive(Serialize)]
struct CommentItemCtx {
    has_mention: bool,
    author: String,
    text: String,
    anchor: String,
}

#[derive(Serialize)]
struct CommentCtx<'a> {
    doc_name: &'a str,
    doc_url: &'a str,
    unsubscribe_url: &'a str,
    unsubscribe_fully_url: &'a str,
    author_names: Vec<String>,
    extra_authors_count: usize,
    has_mentions: bool,
    comments: Vec<CommentItemCtx>,
}

/// Public URL of a document under the configured home origin.
pub fn doc_url(home_url: &str, doc: &DocInfo) -> String {
    format!(
        "{}/docs/{}",
        home_url.trim_end_matches('/'),
        doc.url_id.as_deref().unwrap_or(&doc.id)
    )
}

pub struct EmailRenderer {
    directory: Arc<dyn Directory>,
    mailer: Arc<dyn Mailer>,
    templates: TemplateRenderer,
    sender: SenderConfig,
    home_url: String,
}

impl EmailRenderer {
    pub fn new(
        directory: Arc<dyn Directory>,
        mailer: Arc<dyn Mailer>,
        sender: SenderConfig,
        home_url: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            mailer,
            templates: TemplateRenderer::new(),
            sender,
            home_url: home_url.into(),
        }
    }

    fn doc_url(&self, doc: &DocInfo) -> String {
        doc_url(&self.home_url, doc)
    }

    fn unsubscribe_url(&self, token: &str) -> String {
        format!(
            "{}/notifications-unsubscribe?token={}",
            self.home_url.trim_end_matches('/'),
            urlencoding::encode(token)
        )
    }

    /// Best-effort author display name; departed users show a stand-in.
    async fn author_name(&self, author: UserId) -> String {
        match self.directory.user(author).await {
            Ok(user) => user.name,
            Err(_) => "Someone".to_string(),
        }
    }

    async fn render_doc_change(
        &self,
        doc: &DocInfo,
        doc_url: &str,
        unsubscribe_url: &str,
        payloads: Vec<DocChangePayload>,
    ) -> Result<(String, String, String), DocpostError> {
        // Group by author, preserving first-seen order; tables and
        // categories are sorted unions across the author's bundles.
        let mut grouped: Vec<(UserId, BTreeSet<String>, BTreeSet<String>)> = Vec::new();
        for p in payloads {
            match grouped.iter_mut().find(|(author, _, _)| *author == p.author) {
                Some((_, tables, categories)) => {
                    tables.extend(p.table_names);
                    categories.extend(p.categories);
                }
                None => grouped.push((
                    p.author,
                    p.table_names.into_iter().collect(),
                    p.categories.into_iter().collect(),
                )),
            }
        }

        let mut authors = Vec::with_capacity(grouped.len());
        for (author, tables, categories) in grouped {
            let tables: Vec<String> = tables.into_iter().collect();
            authors.push(AuthorChangesCtx {
                user: self.author_name(author).await,
                tables_preview: tables[..tables.len().min(2)].join(", "),
                extra_tables_count: tables.len().saturating_sub(2),
                tables,
                categories: categories.into_iter().collect(),
            });
        }
        let sender_author_name = match &authors[..] {
            [only] => Some(only.user.clone()),
            _ => None,
        };

        let ctx = DocChangeCtx {
            doc_name: &doc.name,
            doc_url,
            unsubscribe_url,
            sender_author_name,
            authors,
        };
        Ok((
            self.templates.render("doc-change-subject.txt", &ctx)?,
            self.templates.render("doc-change.txt", &ctx)?,
            self.templates.render("doc-change.html", &ctx)?,
        ))
    }

    async fn render_comment(
        &self,
        doc: &DocInfo,
        doc_url: &str,
        unsubscribe_url: &str,
        unsubscribe_fully_url: &str,
        payloads: Vec<CommentPayload>,
    ) -> Result<(String, String, String), DocpostError> {
        let mut author_ids: Vec<UserId> = Vec::new();
        for p in &payloads {
            if !author_ids.contains(&p.author) {
                author_ids.push(p.author);
            }
        }
        let mut author_names = Vec::new();
        for author in author_ids.iter().take(2) {
            author_names.push(self.author_name(*author).await);
        }
        let has_mentions = payloads.iter().any(|p| p.has_mention);

        let mut comments = Vec::with_capacity(payloads.len());
        for p in payloads {
            comments.push(CommentItemCtx {
                has_mention: p.has_mention,
                author: self.author_name(p.author).await,
                text: p.text,
                anchor: p.anchor,
            });
        }

        let ctx = CommentCtx {
            doc_name: &doc.name,
            doc_url,
            unsubscribe_url,
            unsubscribe_fully_url,
            author_names,
            extra_authors_count: author_ids.len().saturating_sub(2),
            has_mentions,
            comments,
        };
        Ok((
            self.templates.render("comment-subject.txt", &ctx)?,
            self.templates.render("comment.txt", &ctx)?,
            self.templates.render("comment.html", &ctx)?,
        ))
    }
}

/// Decode payloads, dropping corrupt entries with a log line.
fn decode_batch<T: serde::de::DeserializeOwned>(batch_key: &str, payloads: Vec<Payload>) -> Vec<T> {
    let mut out = Vec::with_capacity(payloads.len());
    for bytes in payloads {
        match decode(&bytes) {
            Ok(p) => out.push(p),
            Err(e) => tracing::warn!(batch_key, error = %e, "corrupt payload dropped"),
        }
    }
    out
}

#[async_trait]
impl BatchHandler for EmailRenderer {
    async fn handle(
        &self,
        category: Category,
        batch_key: &str,
        payloads: Vec<Payload>,
    ) -> Result<(), DocpostError> {
        let Some((doc_id, user_id)) = parse_batch_key(batch_key) else {
            tracing::error!(batch_key, "unparseable batch key; dropping batch");
            return Ok(());
        };
        let doc = match self.directory.doc_info(&doc_id).await {
            Ok(doc) => doc,
            Err(DocpostError::NotFound(_)) => {
                tracing::info!(doc_id = %doc_id, "document gone; dropping batch");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let recipient: UserProfile = match self.directory.user(user_id).await {
            Ok(user) => user,
            Err(DocpostError::NotFound(_)) => {
                tracing::info!(user_id, "recipient gone; dropping batch");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let unsubscribe_key = self.directory.ensure_unsubscribe_key(user_id).await?;

        let doc_url = self.doc_url(&doc);
        let now = Utc::now();

        let (subject, text, html, list_unsubscribe) = match category {
            Category::DocChange => {
                let batch: Vec<DocChangePayload> = decode_batch(batch_key, payloads);
                if batch.is_empty() {
                    return Ok(());
                }
                let token = token::sign(
                    &doc_id,
                    &recipient.user_ref,
                    UnsubscribeEvent::DocChanges,
                    None,
                    &unsubscribe_key,
                    now,
                );
                let unsubscribe_url = self.unsubscribe_url(&token);
                let (subject, text, html) = self
                    .render_doc_change(&doc, &doc_url, &unsubscribe_url, batch)
                    .await?;
                (subject, text, html, unsubscribe_url)
            }
            Category::Comment => {
                let batch: Vec<CommentPayload> = decode_batch(batch_key, payloads);
                if batch.is_empty() {
                    return Ok(());
                }
                let normal = token::sign(
                    &doc_id,
                    &recipient.user_ref,
                    UnsubscribeEvent::Comments,
                    Some(UnsubscribeMode::Normal),
                    &unsubscribe_key,
                    now,
                );
                let full = token::sign(
                    &doc_id,
                    &recipient.user_ref,
                    UnsubscribeEvent::Comments,
                    Some(UnsubscribeMode::Full),
                    &unsubscribe_key,
                    now,
                );
                let unsubscribe_url = self.unsubscribe_url(&normal);
                let unsubscribe_fully_url = self.unsubscribe_url(&full);
                let (subject, text, html) = self
                    .render_comment(
                        &doc,
                        &doc_url,
                        &unsubscribe_url,
                        &unsubscribe_fully_url,
                        batch,
                    )
                    .await?;
                // The header always carries the normal-mode link; the
                // full-unsubscribe link only appears in the body.
                (subject, text, html, unsubscribe_url)
            }
        };

        let envelope = MailEnvelope {
            from: format!("{} <{}>", self.sender.name, self.sender.from_address()),
            reply_to: Some(self.sender.reply_to_address().to_string()),
            to: vec![format!("{} <{}>", recipient.name, recipient.email)],
            subject,
            text,
            html,
            headers: vec![("List-Unsubscribe".to_string(), format!("<{list_unsubscribe}>"))],
        };

        self.mailer.send(&envelope).await?;
        tracing::info!(
            category = %category,
            doc_id = %doc_id,
            recipient = recipient.id,
            transport = self.mailer.transport_name(),
            "notification mail sent"
        );
        Ok(())
    }
}
