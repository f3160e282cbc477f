use crate::{
    AppState,
    auth::{FeatureGate, require_feature},
    handlers,
    roles::ProductFeature,
};
use axum::{
    Router, middleware,
    routing::get,
};

/// Admin Router Module
///
/// User management. The whole router is wrapped in the `ManageUsers` feature gate, which
/// itself sits inside the session gate applied by `create_router`.
pub fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // GET/POST /admin/users
        // Paged listing (10 per page) and account creation.
        .route(
            "/admin/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        // GET/PUT/DELETE /admin/users/{id}
        // Update replaces the profile and the full role set; delete is a soft delete.
        .route(
            "/admin/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(
            FeatureGate::new(state, ProductFeature::ManageUsers),
            require_feature,
        ))
}
