use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes any signed-in user may call. Every handler here relies on the session gate being
/// layered above this router, which attaches the `AuthUser`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /account/session
        // The caller's user id and allowed features.
        .route("/account/session", get(handlers::get_session))
        // POST /account/sign-out
        .route("/account/sign-out", post(handlers::sign_out))
}
