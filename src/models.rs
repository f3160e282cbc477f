use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppError,
    roles::{ProductFeature, Role},
};

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// An account row from the `users` table. Deletion is a tombstone (`deleted_at`), so role
/// mappings and revisions referencing the user stay intact.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// NewUser
///
/// A normalised, already-hashed account ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub display_name: String,
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

/// UserProfile
///
/// The mutable profile columns of a user.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub display_name: String,
    pub email: String,
    pub username: String,
}

/// Page
///
/// A named content entity. `published_revision_id` is the only pointer to what is live;
/// it is moved by publishing and never copies content.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Page {
    #[ts(type = "number")]
    pub id: i64,
    pub title: String,
    #[ts(type = "number | null")]
    pub published_revision_id: Option<i64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    #[ts(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// ContentRevision
///
/// An immutable snapshot of a page's content. The most recent row for a page is its
/// current draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct ContentRevision {
    #[ts(type = "number")]
    pub id: i64,
    #[ts(type = "number")]
    pub page_id: i64,
    pub rendered_html: String,
    pub rendered_css: String,
    pub editor_content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// DraftContent
///
/// The content carried by a revision that has not been stored yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftContent {
    pub rendered_html: String,
    pub rendered_css: String,
    pub editor_content: String,
}

/// NewRevision
///
/// A revision bound for insertion. It has no id: revisions are append-only.
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub page_id: i64,
    pub content: DraftContent,
}

/// Settings
///
/// The single active site settings row.
#[derive(Debug, Clone)]
pub struct Settings {
    pub active: bool,
    pub site_name: String,
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// SiteSetupRequest
///
/// First-run payload (POST /setup): names the site and creates its first administrator.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SiteSetupRequest {
    pub site_name: String,
    pub display_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

/// SignInRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
}

/// CreateUserRequest
///
/// Admin payload for POST /admin/users.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub display_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub roles: Vec<Role>,
}

/// UpdateUserRequest
///
/// Admin payload for PUT /admin/users/{id}. `roles` is the complete desired role set.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUserRequest {
    pub display_name: String,
    pub email: String,
    pub username: String,
    pub roles: Vec<Role>,
}

/// CreatePageRequest
///
/// Payload for POST /pages: the title plus the content of the first draft.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatePageRequest {
    pub title: String,
    #[serde(default)]
    pub rendered_html: String,
    #[serde(default)]
    pub rendered_css: String,
    #[serde(default)]
    pub editor_content: String,
}

/// SaveDraftRequest
///
/// Payload for POST /pages/{id}/drafts. `revision_id` must be absent: a draft is always a
/// new revision.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SaveDraftRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number | null")]
    pub revision_id: Option<i64>,
    #[serde(default)]
    pub rendered_html: String,
    #[serde(default)]
    pub rendered_css: String,
    pub editor_content: String,
}

/// ListQuery
///
/// Zero-based paging parameters shared by the list endpoints.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Zero-based page number. Defaults to 0.
    pub page: Option<i64>,
    /// Rows per page. Defaults to 10, max 100.
    pub per_page: Option<i64>,
}

pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: i64 = 100;

impl ListQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(0)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).min(MAX_PER_PAGE)
    }
}

/// Number of pages needed to show `total_count` rows `per_page` at a time.
pub fn page_count(total_count: i64, per_page: i64) -> i64 {
    if per_page < 1 {
        return 0;
    }
    (total_count + per_page - 1) / per_page
}

// --- Response Schemas (Output) ---

/// SessionInfo
///
/// Output of GET /account/session.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionInfo {
    #[ts(type = "number")]
    pub user_id: i64,
    pub allowed_features: Vec<ProductFeature>,
}

/// UserSummary
///
/// A user as shown to administrators, with the roles currently mapped to them.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserSummary {
    #[ts(type = "number")]
    pub id: i64,
    pub display_name: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
    #[ts(type = "number")]
    pub page_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatedResponse {
    #[ts(type = "number")]
    pub id: i64,
}

/// PageWithDraft
///
/// Output of GET /pages/{id}: the page and its most recent revision, if any.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PageWithDraft {
    pub page: Page,
    pub draft: Option<ContentRevision>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PageListResponse {
    pub pages: Vec<Page>,
    #[ts(type = "number")]
    pub total_count: i64,
    #[ts(type = "number")]
    pub page_count: i64,
}

// --- Input validation ---

fn require(value: &str, field: &str, max_len: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidArgument(format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(AppError::InvalidArgument(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(())
}

fn validate_account_fields(
    display_name: &str,
    email: &str,
    username: &str,
) -> Result<(), AppError> {
    require(display_name, "display_name", 100)?;
    require(email, "email", 255)?;
    require(username, "username", 100)?;
    if !email.contains('@') {
        return Err(AppError::InvalidArgument("email is not valid".into()));
    }
    if !username.trim().chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidArgument(
            "username may only contain letters and digits".into(),
        ));
    }
    Ok(())
}

impl SiteSetupRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require(&self.site_name, "site_name", 100)?;
        validate_account_fields(&self.display_name, &self.email, &self.username)?;
        require(&self.password, "password", 1024)
    }
}

impl SignInRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require(&self.username, "username", 100)?;
        require(&self.password, "password", 1024)
    }
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_account_fields(&self.display_name, &self.email, &self.username)?;
        require(&self.password, "password", 1024)
    }
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_account_fields(&self.display_name, &self.email, &self.username)
    }
}

impl CreatePageRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require(&self.title, "title", 255)
    }
}

impl SaveDraftRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.editor_content.is_empty() {
            return Err(AppError::InvalidArgument("editor_content is required".into()));
        }
        Ok(())
    }
}
