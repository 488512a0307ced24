//! API router for connections-auth.
//!
//! Mounts all endpoint groups under /v1:
//! - /v1/auth   — providers, sign-in, callbacks, session, sign-out, token reads
//! - /v1/status — Health check

mod cookies;
pub mod routes;

use crate::SharedState;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use cookies::{OAUTH_STATE_COOKIE, SESSION_COOKIE};

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/v1", routes::v1_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
