//! HTTP router construction.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::api;
use crate::identity;
use crate::state::AppState;

/// CORS layer honoring the configured origin; `"*"` (the default)
/// allows any origin.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            tracing::warn!(origin, "invalid CORS_ORIGIN; falling back to permissive");
            CorsLayer::permissive()
        }
    }
}

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);
    Router::new()
        .route("/health", get(api::health))
        .route(
            "/api/docs/{doc_id}/notifications-config",
            get(api::get_notifications_config).post(api::set_notifications_config),
        )
        .route("/notifications-unsubscribe", get(api::unsubscribe))
        .layer(axum::middleware::from_fn(identity::header_identity))
        .layer(cors)
        .with_state(state)
}
