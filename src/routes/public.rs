use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Monitoring and load balancer checks.
        .route("/health", get(handlers::health))
        // POST /setup
        // First-run only: names the site and creates the first admin.
        .route("/setup", post(handlers::setup_site))
        // POST /sign-in
        // Username/password in, session cookie out.
        .route("/sign-in", post(handlers::sign_in))
}
