use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;

use super::Repository;
use crate::{
    error::StoreError,
    models::{ContentRevision, DraftContent, NewRevision, NewUser, Page, User, UserProfile},
    roles::Role,
};

const USER_COLUMNS: &str =
    "id, display_name, email, username, password_hash, created_at, updated_at, deleted_at";

const PAGE_COLUMNS: &str = "id, title, published_revision_id, created_at, updated_at, deleted_at";

const REVISION_COLUMNS: &str =
    "id, page_id, rendered_html, rendered_css, editor_content, created_at";

/// PostgresRepository
///
/// The `Repository` backed by PostgreSQL. Every multi-statement operation runs in an
/// explicit transaction; dropping an uncommitted `Transaction` rolls it back, so an early
/// `?` return never leaves partial writes behind.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

async fn insert_user(
    tx: &mut Transaction<'_, Postgres>,
    user: &NewUser,
) -> Result<i64, StoreError> {
    let id: i64 = sqlx::query_scalar(
        r#"INSERT INTO users (display_name, email, username, password_hash)
           VALUES ($1, $2, $3, $4)
           RETURNING id"#,
    )
    .bind(&user.display_name)
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.password_hash)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

async fn insert_revision(
    tx: &mut Transaction<'_, Postgres>,
    page_id: i64,
    content: &DraftContent,
) -> Result<i64, StoreError> {
    let id: i64 = sqlx::query_scalar(
        r#"INSERT INTO content_revisions (page_id, rendered_html, rendered_css, editor_content)
           VALUES ($1, $2, $3, $4)
           RETURNING id"#,
    )
    .bind(page_id)
    .bind(&content.rendered_html)
    .bind(&content.rendered_css)
    .bind(&content.editor_content)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

/// Reconciles the user's mappings to exactly `roles` inside `tx`: lock the current rows,
/// delete the ones not desired, insert the missing ones.
async fn sync_roles(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    roles: &BTreeSet<Role>,
) -> Result<(), StoreError> {
    let desired: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();

    let current: Vec<String> =
        sqlx::query_scalar("SELECT user_role FROM role_mappings WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_all(&mut **tx)
            .await?;

    sqlx::query("DELETE FROM role_mappings WHERE user_id = $1 AND NOT (user_role = ANY($2))")
        .bind(user_id)
        .bind(&desired)
        .execute(&mut **tx)
        .await?;

    for role in desired.iter().filter(|role| !current.contains(role)) {
        sqlx::query("INSERT INTO role_mappings (user_id, user_role) VALUES ($1, $2)")
            .bind(user_id)
            .bind(role)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_user_with_roles(
        &self,
        user: NewUser,
        roles: &BTreeSet<Role>,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_user(&mut tx, &user).await?;
        sync_roles(&mut tx, id, roles).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL
             ORDER BY id DESC OFFSET $1 LIMIT $2"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn update_user_with_roles(
        &self,
        id: i64,
        profile: UserProfile,
        roles: &BTreeSet<Role>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE users
               SET display_name = $2, email = $3, username = $4, updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .bind(&profile.display_name)
        .bind(&profile.email)
        .bind(&profile.username)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sync_roles(&mut tx, id, roles).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn soft_delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn roles_for_user(&self, user_id: i64) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar(
            "SELECT user_role FROM role_mappings WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn admin_holders(&self) -> Result<Vec<i64>, StoreError> {
        Ok(sqlx::query_scalar(
            r#"SELECT DISTINCT u.id
               FROM users u
               JOIN role_mappings r ON r.user_id = u.id
               WHERE r.user_role = $1 AND u.deleted_at IS NULL
               ORDER BY u.id"#,
        )
        .bind(Role::Admin.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn replace_roles(&self, user_id: i64, roles: &BTreeSet<Role>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sync_roles(&mut tx, user_id, roles).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_page_with_revision(
        &self,
        title: &str,
        content: DraftContent,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let page_id: i64 = sqlx::query_scalar("INSERT INTO pages (title) VALUES ($1) RETURNING id")
            .bind(title)
            .fetch_one(&mut *tx)
            .await?;
        insert_revision(&mut tx, page_id, &content).await?;

        tx.commit().await?;
        Ok(page_id)
    }

    async fn find_page(&self, id: i64) -> Result<Option<Page>, StoreError> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, Page>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn latest_revision(&self, page_id: i64) -> Result<Option<ContentRevision>, StoreError> {
        let sql = format!(
            "SELECT {REVISION_COLUMNS} FROM content_revisions WHERE page_id = $1
             ORDER BY id DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, ContentRevision>(&sql)
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_revision(&self, id: i64) -> Result<Option<ContentRevision>, StoreError> {
        Ok(sqlx::query_as::<_, ContentRevision>(
            r#"SELECT r.id, r.page_id, r.rendered_html, r.rendered_css, r.editor_content,
                      r.created_at
               FROM content_revisions r
               JOIN pages p ON p.id = r.page_id
               WHERE r.id = $1 AND p.deleted_at IS NULL"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn append_revision(&self, revision: NewRevision) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let id = insert_revision(&mut tx, revision.page_id, &revision.content).await?;
        sqlx::query("UPDATE pages SET updated_at = NOW() WHERE id = $1")
            .bind(revision.page_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn set_published_revision(
        &self,
        page_id: i64,
        revision_id: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"UPDATE pages SET published_revision_id = $2, updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(page_id)
        .bind(revision_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_pages(&self, offset: i64, limit: i64) -> Result<Vec<Page>, StoreError> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages WHERE deleted_at IS NULL
             ORDER BY updated_at DESC, id DESC OFFSET $1 LIMIT $2"
        );
        Ok(sqlx::query_as::<_, Page>(&sql)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_pages(&self) -> Result<i64, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn site_exists(&self) -> Result<bool, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM settings WHERE active)")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn initialize_site(&self, site_name: &str, admin: NewUser) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO settings (active, site_name) VALUES (TRUE, $1)")
            .bind(site_name)
            .execute(&mut *tx)
            .await?;
        let user_id = insert_user(&mut tx, &admin).await?;
        sqlx::query("INSERT INTO role_mappings (user_id, user_role) VALUES ($1, $2)")
            .bind(user_id)
            .bind(Role::Admin.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user_id)
    }
}
