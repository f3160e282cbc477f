use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::Mutex;

use super::Repository;
use crate::{
    error::StoreError,
    models::{
        ContentRevision, DraftContent, NewRevision, NewUser, Page, Settings, User, UserProfile,
    },
    roles::Role,
};

#[derive(Clone, Default)]
struct Tables {
    settings: Option<Settings>,
    users: Vec<User>,
    // (user_id, user_role)
    role_mappings: Vec<(i64, String)>,
    pages: Vec<Page>,
    revisions: Vec<ContentRevision>,
    last_id: i64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    /// Strictly increasing timestamps, so "most recently updated" is never a tie.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn live_user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id && u.deleted_at.is_none())
    }

    fn live_page(&self, id: i64) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id && p.deleted_at.is_none())
    }

    fn check_user_unique(
        &self,
        except: Option<i64>,
        username: &str,
        email: &str,
    ) -> Result<(), StoreError> {
        for user in self.users.iter().filter(|u| u.deleted_at.is_none() && Some(u.id) != except) {
            if user.username == username {
                return Err(StoreError::UniqueViolation("idx_users_username".into()));
            }
            if user.email == email {
                return Err(StoreError::UniqueViolation("idx_users_email".into()));
            }
        }
        Ok(())
    }

    fn insert_user(&mut self, new: NewUser) -> Result<i64, StoreError> {
        self.check_user_unique(None, &new.username, &new.email)?;
        let id = self.next_id();
        let now = self.tick();
        self.users.push(User {
            id,
            display_name: new.display_name,
            email: new.email,
            username: new.username,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        });
        Ok(id)
    }

    /// Reconciles the user's mappings to exactly `roles`.
    fn sync_roles(&mut self, user_id: i64, roles: &BTreeSet<Role>) -> Result<(), StoreError> {
        if !self.users.iter().any(|u| u.id == user_id) && !roles.is_empty() {
            return Err(StoreError::ForeignKeyViolation("role_mappings_user_id_fkey".into()));
        }

        let desired: Vec<&str> = roles.iter().map(Role::as_str).collect();
        self.role_mappings
            .retain(|(uid, role)| *uid != user_id || desired.contains(&role.as_str()));

        for role in desired {
            let present = self
                .role_mappings
                .iter()
                .any(|(uid, existing)| *uid == user_id && existing == role);
            if !present {
                self.role_mappings.push((user_id, role.to_string()));
            }
        }
        Ok(())
    }

    fn insert_revision(&mut self, page_id: i64, content: DraftContent) -> i64 {
        let id = self.next_id();
        let created_at = self.tick();
        self.revisions.push(ContentRevision {
            id,
            page_id,
            rendered_html: content.rendered_html,
            rendered_css: content.rendered_css,
            editor_content: content.editor_content,
            created_at,
        });
        id
    }
}

/// MemoryRepository
///
/// An in-process `Repository` with the same constraint behaviour as the Postgres schema
/// (partial unique indexes, foreign keys, soft deletes). Every operation holds one lock for
/// its whole duration, which makes multi-step writes atomic.
///
/// `set_failing(true)` simulates a storage outage: every call returns
/// `StoreError::Unavailable` until it is switched off again. `set_failing_role_writes(true)`
/// fails only the role-mapping step of a write, after the other steps have been staged.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    failing: AtomicBool,
    failing_role_writes: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_role_writes(&self, failing: bool) {
        self.failing_role_writes.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }

    fn check_role_writes(&self) -> Result<(), StoreError> {
        if self.failing_role_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("role mappings unavailable".into()));
        }
        Ok(())
    }

    /// Applies `write` to a copy of the tables and swaps the copy in only when it succeeds,
    /// so a failure at any step leaves nothing behind.
    async fn transaction<T>(
        &self,
        write: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let mut staged = tables.clone();
        let value = write(&mut staged)?;
        *tables = staged;
        Ok(value)
    }

    /// Tombstones a page. Page deletion has no service operation; this exists so callers can
    /// set up soft-deleted lineages.
    pub async fn soft_delete_page(&self, id: i64) -> bool {
        let mut tables = self.tables.lock().await;
        let now = tables.tick();
        match tables.pages.iter_mut().find(|p| p.id == id && p.deleted_at.is_none()) {
            Some(page) => {
                page.deleted_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Every revision of the page, oldest first.
    pub async fn revisions_for_page(&self, page_id: i64) -> Vec<ContentRevision> {
        let tables = self.tables.lock().await;
        tables
            .revisions
            .iter()
            .filter(|r| r.page_id == page_id)
            .cloned()
            .collect()
    }

    /// Live pages with exactly this title.
    pub async fn pages_titled(&self, title: &str) -> Vec<Page> {
        let tables = self.tables.lock().await;
        tables
            .pages
            .iter()
            .filter(|p| p.title == title && p.deleted_at.is_none())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user_with_roles(
        &self,
        user: NewUser,
        roles: &BTreeSet<Role>,
    ) -> Result<i64, StoreError> {
        self.transaction(|tables| {
            let id = tables.insert_user(user)?;
            self.check_role_writes()?;
            tables.sync_roles(id, roles)?;
            Ok(id)
        })
        .await
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().await.live_user(id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.username == username && u.deleted_at.is_none())
            .cloned())
    }

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .rev()
            .filter(|u| u.deleted_at.is_none())
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().filter(|u| u.deleted_at.is_none()).count() as i64)
    }

    async fn update_user_with_roles(
        &self,
        id: i64,
        profile: UserProfile,
        roles: &BTreeSet<Role>,
    ) -> Result<bool, StoreError> {
        self.transaction(|tables| {
            if tables.live_user(id).is_none() {
                return Ok(false);
            }
            tables.check_user_unique(Some(id), &profile.username, &profile.email)?;

            let now = tables.tick();
            if let Some(user) = tables.users.iter_mut().find(|u| u.id == id) {
                user.display_name = profile.display_name;
                user.email = profile.email;
                user.username = profile.username;
                user.updated_at = now;
            }

            self.check_role_writes()?;
            tables.sync_roles(id, roles)?;
            Ok(true)
        })
        .await
    }

    async fn soft_delete_user(&self, id: i64) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let now = tables.tick();
        match tables.users.iter_mut().find(|u| u.id == id && u.deleted_at.is_none()) {
            Some(user) => {
                user.deleted_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn roles_for_user(&self, user_id: i64) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .role_mappings
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, role)| role.clone())
            .collect())
    }

    async fn admin_holders(&self) -> Result<Vec<i64>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let holders: BTreeSet<i64> = tables
            .role_mappings
            .iter()
            .filter(|(uid, role)| role == Role::Admin.as_str() && tables.live_user(*uid).is_some())
            .map(|(uid, _)| *uid)
            .collect();
        Ok(holders.into_iter().collect())
    }

    async fn replace_roles(&self, user_id: i64, roles: &BTreeSet<Role>) -> Result<(), StoreError> {
        self.transaction(|tables| {
            self.check_role_writes()?;
            tables.sync_roles(user_id, roles)
        })
        .await
    }

    async fn create_page_with_revision(
        &self,
        title: &str,
        content: DraftContent,
    ) -> Result<i64, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if tables.pages.iter().any(|p| p.title == title && p.deleted_at.is_none()) {
            return Err(StoreError::UniqueViolation("idx_pages_title".into()));
        }

        let page_id = tables.next_id();
        let now = tables.tick();
        tables.pages.push(Page {
            id: page_id,
            title: title.to_string(),
            published_revision_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        });
        tables.insert_revision(page_id, content);
        Ok(page_id)
    }

    async fn find_page(&self, id: i64) -> Result<Option<Page>, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().await.live_page(id).cloned())
    }

    async fn latest_revision(&self, page_id: i64) -> Result<Option<ContentRevision>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .revisions
            .iter()
            .filter(|r| r.page_id == page_id)
            .max_by_key(|r| r.id)
            .cloned())
    }

    async fn find_revision(&self, id: i64) -> Result<Option<ContentRevision>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .revisions
            .iter()
            .find(|r| r.id == id && tables.live_page(r.page_id).is_some())
            .cloned())
    }

    async fn append_revision(&self, revision: NewRevision) -> Result<i64, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if !tables.pages.iter().any(|p| p.id == revision.page_id) {
            return Err(StoreError::ForeignKeyViolation(
                "content_revisions_page_id_fkey".into(),
            ));
        }

        let id = tables.insert_revision(revision.page_id, revision.content);
        let now = tables.tick();
        if let Some(page) = tables.pages.iter_mut().find(|p| p.id == revision.page_id) {
            page.updated_at = now;
        }
        Ok(id)
    }

    async fn set_published_revision(
        &self,
        page_id: i64,
        revision_id: i64,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if !tables.revisions.iter().any(|r| r.id == revision_id) {
            return Err(StoreError::ForeignKeyViolation(
                "fk_pages_published_revision".into(),
            ));
        }

        let now = tables.tick();
        match tables
            .pages
            .iter_mut()
            .find(|p| p.id == page_id && p.deleted_at.is_none())
        {
            Some(page) => {
                page.published_revision_id = Some(revision_id);
                page.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_pages(&self, offset: i64, limit: i64) -> Result<Vec<Page>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let mut pages: Vec<Page> = tables
            .pages
            .iter()
            .filter(|p| p.deleted_at.is_none())
            .cloned()
            .collect();
        pages.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(pages
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_pages(&self) -> Result<i64, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.pages.iter().filter(|p| p.deleted_at.is_none()).count() as i64)
    }

    async fn site_exists(&self) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().await.settings.is_some())
    }

    async fn initialize_site(&self, site_name: &str, admin: NewUser) -> Result<i64, StoreError> {
        self.transaction(|tables| {
            if tables.settings.is_some() {
                return Err(StoreError::UniqueViolation("settings_pkey".into()));
            }

            let created_at = tables.tick();
            tables.settings = Some(Settings {
                active: true,
                site_name: site_name.to_string(),
                created_at,
            });
            let user_id = tables.insert_user(admin)?;
            self.check_role_writes()?;
            tables.sync_roles(user_id, &BTreeSet::from([Role::Admin]))?;
            Ok(user_id)
        })
        .await
    }
}
