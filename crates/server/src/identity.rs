//! Request identity plumbing.
//!
//! Handlers extract the caller as a [`RequestUser`]. The value rides a
//! request extension: in a real deployment the hosting platform's
//! session middleware inserts it; the layer below translates a plain
//! `X-User-Id` header instead, which is what the dev server and the
//! tests use. Requests without an identity get a 403 from the
//! extractor itself.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use docpost_core::{DocpostError, UserId};

#[derive(Debug, Clone, Copy)]
pub struct RequestUser {
    pub user_id: UserId,
}

impl<S> FromRequestParts<S> for RequestUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestUser>().copied().ok_or_else(|| {
            crate::api::error_response(DocpostError::NotAuthorized("sign in required".to_string()))
        })
    }
}

pub async fn header_identity(mut req: Request, next: Next) -> Response {
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<UserId>().ok());
    if let Some(user_id) = user_id {
        req.extensions_mut().insert(RequestUser { user_id });
    }
    next.run(req).await
}
