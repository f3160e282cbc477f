use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{
        CreatePageRequest, CreateUserRequest, CreatedResponse, DraftContent, ListQuery,
        PageListResponse, PageWithDraft, SaveDraftRequest, SessionInfo, SignInRequest,
        SiteSetupRequest, UpdateUserRequest, UserListResponse, UserSummary, page_count,
    },
    pages::CreatePageOutcome,
    session::{Session, expired_session_cookie, session_cookie, session_token},
    users::CreateUserOutcome,
};

// --- Filter Structs ---

/// UserPageQuery
///
/// Query parameters of GET /admin/users. The page size is fixed.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserPageQuery {
    /// Zero-based page number. Defaults to 0.
    pub page: Option<i64>,
}

// --- Session helpers ---

/// Starts a fresh session for `user_id` and returns the response carrying its cookie.
async fn start_session(
    state: &AppState,
    user_id: i64,
    status: StatusCode,
    body: impl IntoResponse,
) -> AppResult<Response> {
    let mut session = Session::new();
    session.set_user_id(user_id);
    let token = state.sessions.save(&mut session).await?;
    let cookie = session_cookie(
        &token,
        state.sessions.max_age_secs(),
        state.config.secure_cookies(),
    );
    Ok((status, [(header::SET_COOKIE, cookie)], body).into_response())
}

// --- Public Handlers ---

/// health
///
/// [Public Route] Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Alive", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// setup_site
///
/// [Public Route] First-run setup: creates the site settings and the first administrator,
/// then signs that administrator in. Refused with 403 once the site exists.
#[utoipa::path(
    post,
    path = "/setup",
    request_body = SiteSetupRequest,
    responses(
        (status = 201, description = "Site created, session cookie set", body = CreatedResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 403, description = "Site already set up", body = crate::error::ApiError)
    )
)]
pub async fn setup_site(
    State(state): State<AppState>,
    Json(payload): Json<SiteSetupRequest>,
) -> AppResult<Response> {
    payload.validate()?;
    let user_id = state.users().setup_site(payload).await?;
    start_session(&state, user_id, StatusCode::CREATED, Json(CreatedResponse { id: user_id })).await
}

/// sign_in
///
/// [Public Route] Exchanges a username and password for a session cookie.
#[utoipa::path(
    post,
    path = "/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in, session cookie set", body = SessionInfo),
        (
            status = 401,
            description = "Incorrect username or password",
            body = crate::error::ApiError
        )
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> AppResult<Response> {
    payload.validate()?;
    let Some(user) = state
        .users()
        .check_credentials(&payload.username, &payload.password)
        .await?
    else {
        tracing::debug!("sign-in rejected");
        return Err(AppError::InvalidCredentials);
    };

    let features = state.authz().features_for_user(user.id).await?;
    let body = Json(SessionInfo {
        user_id: user.id,
        allowed_features: features.into_iter().collect(),
    });
    tracing::info!(user_id = user.id, "user signed in");
    start_session(&state, user.id, StatusCode::OK, body).await
}

// --- Account Handlers ---

/// get_session
///
/// [Authenticated Route] The signed-in user and the features they may use.
#[utoipa::path(
    get,
    path = "/account/session",
    responses(
        (status = 200, description = "Current session", body = SessionInfo),
        (status = 401, description = "Not signed in", body = crate::error::ApiError)
    )
)]
pub async fn get_session(user: AuthUser) -> Json<SessionInfo> {
    Json(SessionInfo {
        user_id: user.user_id,
        allowed_features: user.features.into_iter().collect(),
    })
}

/// sign_out
///
/// [Authenticated Route] Expires the session server-side and clears the cookie.
#[utoipa::path(
    post,
    path = "/account/sign-out",
    responses((status = 204, description = "Signed out"))
)]
pub async fn sign_out(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    headers: HeaderMap,
) -> AppResult<Response> {
    if let Some(token) = session_token(&headers) {
        if let Ok(mut session) = state.sessions.load(&token).await {
            state.sessions.expire(&mut session).await?;
        }
    }
    tracing::info!(user_id, "user signed out");

    let cookie = expired_session_cookie(state.config.secure_cookies());
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

// --- User Management Handlers (ManageUsers) ---

/// create_user
///
/// [Admin Route] Creates an account with the given roles.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = CreatedResponse),
        (status = 409, description = "Username or email in use", body = crate::error::ApiError)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    payload.validate()?;
    match state.users().create_user(payload).await? {
        CreateUserOutcome::Created(id) => Ok((StatusCode::CREATED, Json(CreatedResponse { id }))),
        CreateUserOutcome::Duplicate => Err(AppError::Conflict(
            "Username or email is already in use.".into(),
        )),
    }
}

/// list_users
///
/// [Admin Route] Ten users per page, newest first.
#[utoipa::path(
    get,
    path = "/admin/users",
    params(UserPageQuery),
    responses((status = 200, description = "Users", body = UserListResponse))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserPageQuery>,
) -> AppResult<Json<UserListResponse>> {
    let (users, page_count) = state.users().list_users(query.page.unwrap_or(0)).await?;
    Ok(Json(UserListResponse { users, page_count }))
}

/// get_user
#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    responses(
        (status = 200, description = "User", body = UserSummary),
        (status = 404, description = "Not Found", body = crate::error::ApiError)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<UserSummary>> {
    Ok(Json(state.users().get_user(id).await?))
}

/// update_user
///
/// [Admin Route] Replaces the profile and the complete role set. Removing the admin role from
/// the last admin is refused with 403 before anything changes.
#[utoipa::path(
    put,
    path = "/admin/users/{id}",
    request_body = UpdateUserRequest,
    responses(
        (status = 204, description = "Updated"),
        (status = 403, description = "Would remove the last admin", body = crate::error::ApiError),
        (status = 404, description = "Not Found", body = crate::error::ApiError),
        (status = 409, description = "Username or email in use", body = crate::error::ApiError)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<StatusCode> {
    payload.validate()?;
    state.users().update_user(id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// delete_user
///
/// [Admin Route] Soft-deletes a user other than the caller.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Cannot delete yourself", body = crate::error::ApiError),
        (status = 404, description = "Not Found", body = crate::error::ApiError)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.users().delete_user(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Page Editor Handlers (AddEditContent) ---

/// create_page
///
/// [Editor Route] Creates a page and its first draft.
#[utoipa::path(
    post,
    path = "/pages",
    request_body = CreatePageRequest,
    responses(
        (status = 201, description = "Page created", body = CreatedResponse),
        (status = 409, description = "Title in use", body = crate::error::ApiError)
    )
)]
pub async fn create_page(
    State(state): State<AppState>,
    Json(payload): Json<CreatePageRequest>,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    payload.validate()?;
    let content = DraftContent {
        rendered_html: payload.rendered_html,
        rendered_css: payload.rendered_css,
        editor_content: payload.editor_content,
    };
    match state.pages().create_page(&payload.title, content).await? {
        CreatePageOutcome::Created(id) => Ok((StatusCode::CREATED, Json(CreatedResponse { id }))),
        CreatePageOutcome::Duplicate => Err(AppError::Conflict(
            "A page with this title already exists.".into(),
        )),
    }
}

/// list_pages
///
/// [Editor Route] Recently edited pages first.
#[utoipa::path(
    get,
    path = "/pages",
    params(ListQuery),
    responses((status = 200, description = "Pages", body = PageListResponse))
)]
pub async fn list_pages(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<PageListResponse>> {
    let per_page = query.per_page();
    let (pages, total_count) = state
        .pages()
        .list_recently_edited(query.page(), per_page)
        .await?;
    Ok(Json(PageListResponse {
        pages,
        total_count,
        page_count: page_count(total_count, per_page),
    }))
}

/// get_page
///
/// [Editor Route] The page with its current draft.
#[utoipa::path(
    get,
    path = "/pages/{id}",
    responses(
        (status = 200, description = "Page and current draft", body = PageWithDraft),
        (status = 404, description = "Not Found", body = crate::error::ApiError)
    )
)]
pub async fn get_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PageWithDraft>> {
    match state.pages().page_with_current_draft(id).await? {
        (Some(page), draft) => Ok(Json(PageWithDraft { page, draft })),
        (None, _) => Err(AppError::NotFound("page does not exist".into())),
    }
}

/// save_draft
///
/// [Editor Route] Appends a new draft revision to the page.
#[utoipa::path(
    post,
    path = "/pages/{id}/drafts",
    request_body = SaveDraftRequest,
    responses(
        (status = 201, description = "Draft saved", body = CreatedResponse),
        (
            status = 400,
            description = "Revision id supplied or content missing",
            body = crate::error::ApiError
        ),
        (status = 404, description = "Not Found", body = crate::error::ApiError)
    )
)]
pub async fn save_draft(
    State(state): State<AppState>,
    Path(page_id): Path<i64>,
    Json(payload): Json<SaveDraftRequest>,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    payload.validate()?;
    let content = DraftContent {
        rendered_html: payload.rendered_html,
        rendered_css: payload.rendered_css,
        editor_content: payload.editor_content,
    };
    let id = state
        .pages()
        .save_draft(page_id, payload.revision_id, content)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// publish_draft
///
/// [Editor Route] Makes the revision the page's published one.
#[utoipa::path(
    post,
    path = "/drafts/{id}/publish",
    responses(
        (status = 204, description = "Published"),
        (status = 404, description = "Draft does not exist", body = crate::error::ApiError)
    )
)]
pub async fn publish_draft(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.pages().publish_draft(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
