//! Notifications-config endpoints: read and write the preference
//! bundles for one document.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use docpost_core::{DocpostError, UserId};
use docpost_notify::{Directory, PrefsPatch};

use crate::identity::RequestUser;
use crate::state::AppState;

use super::error_response;

/// Document-scope gate: the caller must appear in the document's
/// access list. Unknown documents surface as 404 here.
async fn require_doc_access(
    state: &AppState,
    doc_id: &str,
    user_id: UserId,
) -> Result<(), DocpostError> {
    let subscribers = state.directory.access(doc_id).await?;
    if subscribers.iter().any(|s| s.user.id == user_id) {
        Ok(())
    } else {
        Err(DocpostError::NotAuthorized(
            "no access to this document".to_string(),
        ))
    }
}

/// GET `/api/docs/{doc_id}/notifications-config`
pub async fn get_notifications_config(
    State(state): State<Arc<AppState>>,
    Path(doc_id): Path<String>,
    user: RequestUser,
) -> Response {
    if let Err(e) = require_doc_access(&state, &doc_id, user.user_id).await {
        return error_response(e);
    }
    match state.directory.prefs(&doc_id, user.user_id).await {
        Ok(bundle) => Json(bundle).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST `/api/docs/{doc_id}/notifications-config`
///
/// Body is strict: unknown fields and invalid enum values are a 400.
/// Bundles named in the body are replaced wholesale; on success the
/// response body is JSON `null`.
pub async fn set_notifications_config(
    State(state): State<Arc<AppState>>,
    Path(doc_id): Path<String>,
    user: RequestUser,
    body: String,
) -> Response {
    if let Err(e) = require_doc_access(&state, &doc_id, user.user_id).await {
        return error_response(e);
    }
    let patch: PrefsPatch = match serde_json::from_str(&body) {
        Ok(patch) => patch,
        Err(e) => {
            return error_response(DocpostError::InvalidInput(format!(
                "invalid preferences: {e}"
            )));
        }
    };
    match state
        .directory
        .set_prefs(&doc_id, user.user_id, &patch)
        .await
    {
        Ok(()) => Json(serde_json::Value::Null).into_response(),
        Err(e) => error_response(e),
    }
}
