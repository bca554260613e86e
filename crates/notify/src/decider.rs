//! Notification decider.
//!
//! Runs after an edit bundle commits, outside the write path. For each
//! candidate recipient it decides whether a notification is owed and
//! emits `(category, batch_key, payload)` records to the batched-jobs
//! engine. Errors never propagate back to the editing user: everything
//! is logged and dropped here.

use std::collections::HashSet;
use std::sync::Arc;

use docpost_core::{batch_key, Category, DocId, DocpostError, UserId};
use docpost_queue::BatchedJobs;

use crate::directory::{AccessView, Directory, Subscriber};
use crate::payload::{encode, CommentPayload, DocChangePayload};
use crate::prefs::CommentsPref;

/// A committed set of document edits, as handed to the decider.
pub struct EditBundle<'a> {
    pub doc_id: DocId,
    /// `None` for system-synthesized bundles (time ticks, recompute
    /// passes); those never notify anyone.
    pub author: Option<UserId>,
    pub access: &'a dyn AccessView,
    pub has_comments: bool,
}

pub struct NotificationDecider {
    directory: Arc<dyn Directory>,
    engine: Arc<BatchedJobs>,
}

impl NotificationDecider {
    pub fn new(directory: Arc<dyn Directory>, engine: Arc<BatchedJobs>) -> Self {
        Self { directory, engine }
    }

    /// Decide and enqueue notifications for one committed bundle.
    ///
    /// Infallible from the caller's point of view; failures are logged
    /// and the affected recipients simply miss this bundle. A missed
    /// `add` is recovered by the next edit, since `add` is idempotent
    /// per marker.
    pub async fn handle_bundle(&self, bundle: &EditBundle<'_>) {
        if let Err(e) = self.decide(bundle).await {
            tracing::warn!(doc_id = %bundle.doc_id, error = %e, "notification decision failed");
        }
    }

    async fn decide(&self, bundle: &EditBundle<'_>) -> Result<(), DocpostError> {
        let Some(author) = bundle.author else {
            return Ok(());
        };

        let subscribers = self.directory.access(&bundle.doc_id).await?;

        // Quiet-case short-circuit: when the bundle carries no comments
        // and nobody wants doc-change mail, skip the ACL round-trips
        // entirely.
        if !bundle.has_comments && !subscribers.iter().any(|s| s.prefs.doc_changes) {
            return Ok(());
        }

        self.emit_doc_changes(bundle, author, &subscribers).await;

        if bundle.has_comments {
            self.emit_comments(bundle, author, &subscribers).await?;
        }
        Ok(())
    }

    async fn emit_doc_changes(
        &self,
        bundle: &EditBundle<'_>,
        author: UserId,
        subscribers: &[Subscriber],
    ) {
        for sub in subscribers {
            if !sub.prefs.doc_changes || sub.user.id == author || sub.user.kind.is_synthetic() {
                continue;
            }
            let tables = match bundle.access.direct_tables(&sub.user).await {
                Ok(Some(tables)) => tables,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        doc_id = %bundle.doc_id,
                        user_id = sub.user.id,
                        error = %e,
                        "direct-tables lookup failed; skipping recipient"
                    );
                    continue;
                }
            };
            let payload = DocChangePayload {
                author: tables.author,
                table_names: tables.table_names,
                categories: tables.categories,
            };
            self.emit(Category::DocChange, &bundle.doc_id, sub.user.id, &payload)
                .await;
        }
    }

    async fn emit_comments(
        &self,
        bundle: &EditBundle<'_>,
        author: UserId,
        subscribers: &[Subscriber],
    ) -> Result<(), DocpostError> {
        let all_comments = bundle.access.comments_in_bundle(None).await?;
        let participants: HashSet<&str> = all_comments
            .iter()
            .flat_map(|c| c.audience.iter().map(String::as_str))
            .collect();

        for sub in subscribers {
            if sub.prefs.comments == CommentsPref::None
                || sub.user.id == author
                || sub.user.kind.is_synthetic()
            {
                continue;
            }
            let participates = participants.contains(sub.user.user_ref.as_str());
            if !participates && sub.prefs.comments != CommentsPref::All {
                continue;
            }

            let visible = match bundle.access.comments_in_bundle(Some(&sub.user)).await {
                Ok(visible) => visible,
                Err(e) => {
                    tracing::warn!(
                        doc_id = %bundle.doc_id,
                        user_id = sub.user.id,
                        error = %e,
                        "comment ACL filter failed; skipping recipient"
                    );
                    continue;
                }
            };

            let selected: Vec<_> = match sub.prefs.comments {
                CommentsPref::All => visible,
                _ => visible
                    .into_iter()
                    .filter(|c| c.audience.iter().any(|r| *r == sub.user.user_ref))
                    .collect(),
            };
            if selected.is_empty() {
                continue;
            }

            for comment in selected {
                let payload = CommentPayload {
                    author: comment.author,
                    has_mention: comment.mentions.iter().any(|r| *r == sub.user.user_ref),
                    text: comment.text,
                    anchor: comment.anchor,
                };
                self.emit(Category::Comment, &bundle.doc_id, sub.user.id, &payload)
                    .await;
            }
        }
        Ok(())
    }

    /// Encode and hand one payload to the engine. Transient add
    /// failures are logged; the next edit re-adds safely.
    async fn emit<T: serde::Serialize>(
        &self,
        category: Category,
        doc_id: &str,
        recipient: UserId,
        payload: &T,
    ) {
        let encoded = match encode(payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(doc_id, recipient, error = %e, "payload encode failed");
                return;
            }
        };
        let key = batch_key(doc_id, recipient);
        let meta = serde_json::json!({ "docId": doc_id, "recipient": recipient });
        if let Err(e) = self.engine.add(category, &key, meta, encoded).await {
            tracing::warn!(
                doc_id,
                recipient,
                category = %category,
                error = %e,
                "enqueue failed; will recover on next edit"
            );
        }
    }
}
