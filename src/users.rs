use std::collections::BTreeSet;

use crate::{
    authorization::{AuthorizationService, LAST_ADMIN_MESSAGE},
    error::{AppError, AppResult, StoreError},
    models::{
        CreateUserRequest, NewUser, SiteSetupRequest, UpdateUserRequest, User, UserProfile,
        UserSummary, page_count,
    },
    password::PasswordHasher,
    repository::RepositoryState,
    roles::Role,
};

/// Fixed page size of the admin user listing.
pub const USERS_PER_PAGE: i64 = 10;

const DUPLICATE_USER_MESSAGE: &str = "Username or email is already in use.";

/// CreateUserOutcome
///
/// A taken username or email is an expected result of account creation, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created(i64),
    Duplicate,
}

/// Usernames are case-insensitive; they are stored trimmed and lower-cased.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

fn normalize_profile(display_name: &str, email: &str, username: &str) -> UserProfile {
    UserProfile {
        display_name: display_name.trim().to_string(),
        email: email.trim().to_lowercase(),
        username: normalize_username(username),
    }
}

/// UserService
///
/// Account management over the `Repository`: creation, listing, profile and role updates,
/// soft deletion, credential checks and first-run site setup.
#[derive(Clone)]
pub struct UserService {
    repo: RepositoryState,
    authz: AuthorizationService,
    hasher: PasswordHasher,
}

impl UserService {
    pub fn new(repo: RepositoryState, hasher: PasswordHasher) -> Self {
        Self {
            authz: AuthorizationService::new(repo.clone()),
            repo,
            hasher,
        }
    }

    /// Argon2 is CPU-bound, so hashing runs on the blocking pool.
    async fn hash_password(&self, password: String) -> AppResult<String> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    }

    async fn summarize(&self, user: User) -> AppResult<UserSummary> {
        let roles = self.authz.roles_for_user(user.id).await?;
        Ok(UserSummary {
            id: user.id,
            display_name: user.display_name,
            username: user.username,
            email: user.email,
            roles: roles.into_iter().collect(),
        })
    }

    /// create_user
    ///
    /// The account and its role mappings are written together; a failure leaves neither.
    pub async fn create_user(&self, req: CreateUserRequest) -> AppResult<CreateUserOutcome> {
        let profile = normalize_profile(&req.display_name, &req.email, &req.username);
        let password_hash = self.hash_password(req.password).await?;

        let new_user = NewUser {
            display_name: profile.display_name,
            email: profile.email,
            username: profile.username,
            password_hash,
        };
        let roles: BTreeSet<Role> = req.roles.into_iter().collect();
        let user_id = match self.repo.create_user_with_roles(new_user, &roles).await {
            Ok(id) => id,
            Err(StoreError::UniqueViolation(constraint)) => {
                tracing::debug!(constraint = %constraint, "duplicate user rejected");
                return Ok(CreateUserOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id, roles = ?roles, "user created");
        Ok(CreateUserOutcome::Created(user_id))
    }

    /// list_users
    ///
    /// One zero-based page of live users, newest first, with the total page count.
    pub async fn list_users(&self, page: i64) -> AppResult<(Vec<UserSummary>, i64)> {
        if page < 0 {
            return Err(AppError::InvalidArgument("page must not be negative".into()));
        }

        let total = self.repo.count_users().await?;
        let users = self
            .repo
            .list_users(page.saturating_mul(USERS_PER_PAGE), USERS_PER_PAGE)
            .await?;

        let mut summaries = Vec::with_capacity(users.len());
        for user in users {
            summaries.push(self.summarize(user).await?);
        }
        Ok((summaries, page_count(total, USERS_PER_PAGE)))
    }

    pub async fn get_user(&self, user_id: i64) -> AppResult<UserSummary> {
        match self.repo.find_user(user_id).await? {
            Some(user) => self.summarize(user).await,
            None => Err(AppError::NotFound("user does not exist".into())),
        }
    }

    /// update_user
    ///
    /// Rejects a change that would remove the last admin before writing anything, then
    /// applies the profile and the role set in one repository transaction. A username/email
    /// collision surfaces as `Conflict`.
    pub async fn update_user(&self, user_id: i64, req: UpdateUserRequest) -> AppResult<()> {
        if self.repo.find_user(user_id).await?.is_none() {
            return Err(AppError::NotFound("user does not exist".into()));
        }

        let roles: BTreeSet<Role> = req.roles.into_iter().collect();
        if self.authz.would_remove_last_admin(user_id, &roles).await? {
            tracing::warn!(user_id, "rejected removal of the last admin");
            return Err(AppError::PolicyViolation(LAST_ADMIN_MESSAGE.into()));
        }

        let profile = normalize_profile(&req.display_name, &req.email, &req.username);
        match self.repo.update_user_with_roles(user_id, profile, &roles).await {
            Ok(true) => {}
            Ok(false) => return Err(AppError::NotFound("user does not exist".into())),
            Err(StoreError::UniqueViolation(_)) => {
                return Err(AppError::Conflict(DUPLICATE_USER_MESSAGE.into()));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id, roles = ?roles, "user updated");
        Ok(())
    }

    /// delete_user
    ///
    /// Soft-deletes `user_id`. The signed-in user cannot delete themselves.
    pub async fn delete_user(&self, acting_user_id: i64, user_id: i64) -> AppResult<()> {
        if acting_user_id == user_id {
            return Err(AppError::PolicyViolation(
                "You can't delete the user you are logged in as.".into(),
            ));
        }
        if !self.repo.soft_delete_user(user_id).await? {
            return Err(AppError::NotFound("user does not exist".into()));
        }
        tracing::info!(user_id, deleted_by = acting_user_id, "user deleted");
        Ok(())
    }

    /// check_credentials
    ///
    /// The user when `password` matches, `None` otherwise. Unknown usernames and wrong
    /// passwords are indistinguishable to the caller.
    pub async fn check_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> AppResult<Option<User>> {
        let Some(user) = self
            .repo
            .find_user_by_username(&normalize_username(username))
            .await?
        else {
            return Ok(None);
        };

        let hasher = self.hasher;
        let stored = user.password_hash.clone();
        let candidate = password.to_string();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&stored, &candidate))
            .await
            .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))?
            .map_err(|e| AppError::Internal(format!("stored password hash is invalid: {e}")))?;

        Ok(matches.then_some(user))
    }

    /// setup_site
    ///
    /// First run only: creates the settings row and the first user, who becomes the admin.
    pub async fn setup_site(&self, req: SiteSetupRequest) -> AppResult<i64> {
        if self.repo.site_exists().await? {
            return Err(AppError::PolicyViolation(
                "This site has already been set up.".into(),
            ));
        }

        let profile = normalize_profile(&req.display_name, &req.email, &req.username);
        let password_hash = self.hash_password(req.password).await?;
        let admin = NewUser {
            display_name: profile.display_name,
            email: profile.email,
            username: profile.username,
            password_hash,
        };

        match self.repo.initialize_site(req.site_name.trim(), admin).await {
            Ok(user_id) => {
                tracing::info!(user_id, "site set up");
                Ok(user_id)
            }
            // Lost a race with a concurrent setup.
            Err(StoreError::UniqueViolation(_)) => Err(AppError::PolicyViolation(
                "This site has already been set up.".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}
