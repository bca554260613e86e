//! API endpoint modules.
//!
//! Shared error mapping and the health endpoint live here in mod.rs.

mod config;
mod unsubscribe;

pub use config::{get_notifications_config, set_notifications_config};
pub use unsubscribe::unsubscribe;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use docpost_core::DocpostError;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map pipeline error kinds onto HTTP statuses. Token errors never
/// reach this path; the unsubscribe endpoint answers 200 for them.
pub(crate) fn error_response(err: DocpostError) -> Response {
    let status = match &err {
        DocpostError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DocpostError::NotAuthorized(_) => StatusCode::FORBIDDEN,
        DocpostError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: err.to_string() })).into_response()
}

// ── Health ───────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
