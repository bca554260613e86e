//! HTTP surface for the notification pipeline.
//!
//! Three endpoints: notifications-config get/set (document scope) and
//! the signed, login-free unsubscribe page. Everything else about the
//! hosting platform (auth, document serving) lives outside this crate;
//! request identity arrives as a [`identity::RequestUser`] extension.

pub mod api;
pub mod identity;
pub mod router;
pub mod state;

pub use identity::RequestUser;
pub use router::build_router;
pub use state::AppState;
