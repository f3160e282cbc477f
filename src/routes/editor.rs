use crate::{
    AppState,
    auth::{FeatureGate, require_feature},
    handlers,
    roles::ProductFeature,
};
use axum::{
    Router, middleware,
    routing::{get, post},
};

/// Editor Router Module
///
/// The page draft/publish workflow, gated on `AddEditContent`.
pub fn editor_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // GET/POST /pages
        // Recently edited listing and page creation (with its first draft).
        .route("/pages", get(handlers::list_pages).post(handlers::create_page))
        // GET /pages/{id}
        // The page and its current (most recent) draft.
        .route("/pages/{id}", get(handlers::get_page))
        // POST /pages/{id}/drafts
        // Appends a draft; revisions are never edited in place.
        .route("/pages/{id}/drafts", post(handlers::save_draft))
        // POST /drafts/{id}/publish
        // Points the owning page at this revision.
        .route("/drafts/{id}/publish", post(handlers::publish_draft))
        .route_layer(middleware::from_fn_with_state(
            FeatureGate::new(state, ProductFeature::AddEditContent),
            require_feature,
        ))
}
