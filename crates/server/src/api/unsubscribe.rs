//! Self-service unsubscribe endpoint.
//!
//! Validates the signed token and applies the preference change to
//! the recipient's current-user overrides only. Every outcome is an
//! HTTP 200 HTML page: failures render a generic "link didn't work"
//! page rather than an error status, so the endpoint cannot be used
//! to probe which user refs exist.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use chrono::Utc;
use serde::Deserialize;

use docpost_notify::render::doc_url;
use docpost_notify::token::{self, UnsubscribeEvent, UnsubscribeMode};
use docpost_notify::{overlay, CommentsPref, Directory, DocPrefs, PrefsPatch};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub token: Option<String>,
}

const FALLBACK_FAILED_PAGE: &str =
    "<html><body><h1>This link didn't work</h1><p>Sign in to adjust your \
     notification settings.</p></body></html>";

fn failed_page(state: &AppState) -> Html<String> {
    Html(
        state
            .pages
            .render("unsubscribe-failed.html", serde_json::json!({}))
            .unwrap_or_else(|_| FALLBACK_FAILED_PAGE.to_string()),
    )
}

/// GET `/notifications-unsubscribe?token=…`
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnsubscribeQuery>,
) -> Html<String> {
    let Some(raw) = query.token else {
        return failed_page(&state);
    };
    let parsed = match token::parse(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "unsubscribe token failed to parse");
            return failed_page(&state);
        }
    };

    let user = match state.directory.user_by_ref(&parsed.user_ref).await {
        Ok(Some(user)) => user,
        Ok(None) | Err(_) => return failed_page(&state),
    };
    let Some(key) = user.unsubscribe_key.clone() else {
        // Never mailed, so no link of theirs can be valid.
        return failed_page(&state);
    };
    if let Err(e) = token::verify(&parsed, &key, Utc::now()) {
        tracing::debug!(user_ref = %parsed.user_ref, error = %e, "unsubscribe token rejected");
        return failed_page(&state);
    }

    let (field_patch, change) = match parsed.event {
        UnsubscribeEvent::DocChanges => (
            DocPrefs {
                doc_changes: Some(false),
                comments: None,
            },
            "You will no longer get emails about changes to this document.",
        ),
        UnsubscribeEvent::Comments => match parsed.mode {
            Some(UnsubscribeMode::Full) => (
                DocPrefs {
                    doc_changes: None,
                    comments: Some(CommentsPref::None),
                },
                "You will no longer get emails about comments on this document.",
            ),
            _ => (
                DocPrefs {
                    doc_changes: None,
                    comments: Some(CommentsPref::Relevant),
                },
                "You will now only get emails about comments that involve you.",
            ),
        },
    };

    // Read-modify-write the current-user overrides; document defaults
    // stay untouched.
    let bundle = match state.directory.prefs(&parsed.doc_id, user.id).await {
        Ok(bundle) => bundle,
        Err(_) => return failed_page(&state),
    };
    let merged = overlay(&bundle.current_user, &field_patch);
    let patch = PrefsPatch {
        doc_defaults: None,
        current_user: Some(merged),
    };
    if let Err(e) = state
        .directory
        .set_prefs(&parsed.doc_id, user.id, &patch)
        .await
    {
        tracing::warn!(doc_id = %parsed.doc_id, user_id = user.id, error = %e, "unsubscribe write failed");
        return failed_page(&state);
    }

    let doc = match state.directory.doc_info(&parsed.doc_id).await {
        Ok(doc) => doc,
        Err(_) => return failed_page(&state),
    };
    tracing::info!(
        doc_id = %parsed.doc_id,
        user_id = user.id,
        event = parsed.event.as_str(),
        "unsubscribe applied"
    );
    Html(
        state
            .pages
            .render(
                "unsubscribe-confirmed.html",
                serde_json::json!({
                    "doc_name": doc.name,
                    "doc_url": doc_url(&state.config.home_url, &doc),
                    "change": change,
                }),
            )
            .unwrap_or_else(|_| FALLBACK_FAILED_PAGE.to_string()),
    )
}
