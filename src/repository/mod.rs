use async_trait::async_trait;
use std::{collections::BTreeSet, sync::Arc};

use crate::{
    error::StoreError,
    models::{ContentRevision, DraftContent, NewRevision, NewUser, Page, User, UserProfile},
    roles::Role,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Repository Trait
///
/// The storage client injected into every service. Implementations surface unique and
/// foreign-key violations as their own `StoreError` variants so callers can tell business
/// conflicts apart from infrastructure failures.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum's tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    /// Inserts the user and its role mappings in one transaction, returning the user id.
    async fn create_user_with_roles(
        &self,
        user: NewUser,
        roles: &BTreeSet<Role>,
    ) -> Result<i64, StoreError>;
    // Live (non-deleted) users only, here and below.
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    // Newest first.
    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError>;
    async fn count_users(&self) -> Result<i64, StoreError>;
    /// update_user_with_roles
    ///
    /// Replaces the profile and reconciles the role mappings to exactly `roles`, all or
    /// nothing. Returns false (and writes nothing) when no live user has that id.
    async fn update_user_with_roles(
        &self,
        id: i64,
        profile: UserProfile,
        roles: &BTreeSet<Role>,
    ) -> Result<bool, StoreError>;
    async fn soft_delete_user(&self, id: i64) -> Result<bool, StoreError>;

    // --- Role mappings ---
    /// Raw role names mapped to the user, as persisted.
    async fn roles_for_user(&self, user_id: i64) -> Result<Vec<String>, StoreError>;
    /// Ids of live users holding the admin role.
    async fn admin_holders(&self) -> Result<Vec<i64>, StoreError>;
    /// replace_roles
    ///
    /// Reconciles the user's mappings to exactly `roles` in one transaction: read, delete the
    /// mappings not desired, insert the missing ones. Nothing is visible on failure.
    async fn replace_roles(&self, user_id: i64, roles: &BTreeSet<Role>) -> Result<(), StoreError>;

    // --- Pages & revisions ---
    /// Inserts the page and its first revision atomically, returning the page id.
    async fn create_page_with_revision(
        &self,
        title: &str,
        content: DraftContent,
    ) -> Result<i64, StoreError>;
    async fn find_page(&self, id: i64) -> Result<Option<Page>, StoreError>;
    /// The most recently created revision of the page.
    async fn latest_revision(&self, page_id: i64) -> Result<Option<ContentRevision>, StoreError>;
    /// A revision whose page is still live.
    async fn find_revision(&self, id: i64) -> Result<Option<ContentRevision>, StoreError>;
    /// append_revision
    ///
    /// Inserts the revision and bumps the page's `updated_at` in one transaction.
    /// A missing page surfaces as `ForeignKeyViolation`.
    async fn append_revision(&self, revision: NewRevision) -> Result<i64, StoreError>;
    async fn set_published_revision(
        &self,
        page_id: i64,
        revision_id: i64,
    ) -> Result<bool, StoreError>;
    /// Live pages, most recently updated first, ties broken by id.
    async fn list_pages(&self, offset: i64, limit: i64) -> Result<Vec<Page>, StoreError>;
    async fn count_pages(&self) -> Result<i64, StoreError>;

    // --- Settings ---
    async fn site_exists(&self) -> Result<bool, StoreError>;
    /// initialize_site
    ///
    /// First-run bootstrap: the active settings row, the first user and its admin mapping,
    /// all or nothing. Returns the new user's id.
    async fn initialize_site(&self, site_name: &str, admin: NewUser) -> Result<i64, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
