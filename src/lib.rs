use axum::{Router, extract::FromRef, http::HeaderName, middleware};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain core: role table, authorization, page lifecycle, accounts.
pub mod authorization;
pub mod pages;
pub mod roles;
pub mod users;

// Infrastructure and HTTP boundary.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod session;

// Module for routing segregation (Public, Authenticated, Admin, Editor).
pub mod routes;
use routes::{admin, authenticated, editor, public};

// --- Public Re-exports ---

pub use authorization::AuthorizationService;
pub use config::AppConfig;
pub use error::{AppError, AppResult, StoreError};
pub use pages::{CreatePageOutcome, PageService};
pub use repository::{MemoryRepository, PostgresRepository, Repository, RepositoryState};
pub use session::{MemorySessionStore, SessionState, SessionStore, SignedCookieStore};
pub use users::{CreateUserOutcome, UserService};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI document
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::setup_site, handlers::sign_in,
        handlers::get_session, handlers::sign_out,
        handlers::create_user, handlers::list_users, handlers::get_user,
        handlers::update_user, handlers::delete_user,
        handlers::create_page, handlers::list_pages, handlers::get_page,
        handlers::save_draft, handlers::publish_draft
    ),
    components(
        schemas(
            models::Page, models::ContentRevision, models::SiteSetupRequest,
            models::SignInRequest, models::CreateUserRequest, models::UpdateUserRequest,
            models::CreatePageRequest, models::SaveDraftRequest, models::SessionInfo,
            models::UserSummary, models::UserListResponse, models::CreatedResponse,
            models::PageWithDraft, models::PageListResponse, roles::Role,
            roles::ProductFeature, error::ApiError,
        )
    ),
    tags(
        (name = "tinypress", description = "Tinypress CMS API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of everything a request needs. Services are built on
/// demand from it; they only hold `Arc`s, so this is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: the injected storage client.
    pub repo: RepositoryState,
    /// Session Layer: resolves session cookies.
    pub sessions: SessionState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    pub fn authz(&self) -> AuthorizationService {
        AuthorizationService::new(self.repo.clone())
    }

    pub fn pages(&self) -> PageService {
        PageService::new(self.repo.clone())
    }

    pub fn users(&self) -> UserService {
        UserService::new(
            self.repo.clone(),
            password::PasswordHasher::new(self.config.password_hash_cost),
        )
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing structure, applies the gates and the observability layers, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Protected routes: feature gates sit inside the session gate, so they always see
    // an authenticated request.
    let protected = Router::new()
        .merge(authenticated::authenticated_routes())
        .merge(admin::admin_routes(state.clone()))
        .merge(editor::editor_routes(state.clone()))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    // 3. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing: one span per request, tagged with the request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: HTTP method, URI and the `x-request-id` header, so every
/// log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
