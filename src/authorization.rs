use std::collections::BTreeSet;

use crate::{
    error::{AppError, AppResult},
    repository::RepositoryState,
    roles::{FeatureSet, Role, features_for_roles},
};

pub const LAST_ADMIN_MESSAGE: &str = "You need at least one user with the admin role.";

/// AuthorizationService
///
/// Resolves a user's effective feature set from their persisted role mappings and guards
/// role changes with the "at least one admin" rule. Holds no state of its own; every call
/// reads storage afresh.
#[derive(Clone)]
pub struct AuthorizationService {
    repo: RepositoryState,
}

impl AuthorizationService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// features_for_user
    ///
    /// Union of the features of every role mapped to the user. A user with no mappings (or
    /// only unrecognised role names) gets an empty set, not an error.
    pub async fn features_for_user(&self, user_id: i64) -> AppResult<FeatureSet> {
        let roles = self.roles_for_user(user_id).await?;
        Ok(features_for_roles(&roles))
    }

    /// The recognised roles currently mapped to the user.
    pub async fn roles_for_user(&self, user_id: i64) -> AppResult<BTreeSet<Role>> {
        let roles = self.repo.roles_for_user(user_id).await?;
        Ok(roles.iter().filter_map(|name| Role::parse(name)).collect())
    }

    /// set_roles_for_user
    ///
    /// Reconciles the user's mappings to exactly `desired`, atomically. Idempotent.
    pub async fn set_roles_for_user(
        &self,
        user_id: i64,
        desired: &BTreeSet<Role>,
    ) -> AppResult<()> {
        if user_id < 1 {
            return Err(AppError::InvalidArgument("user id is invalid".into()));
        }
        self.repo.replace_roles(user_id, desired).await?;
        tracing::info!(user_id, roles = ?desired, "roles updated");
        Ok(())
    }

    /// would_remove_last_admin
    ///
    /// True only when `user_id` is currently the sole live admin and `desired` drops Admin.
    pub async fn would_remove_last_admin(
        &self,
        user_id: i64,
        desired: &BTreeSet<Role>,
    ) -> AppResult<bool> {
        if user_id < 1 {
            return Err(AppError::InvalidArgument("user id is invalid".into()));
        }
        if desired.contains(&Role::Admin) {
            return Ok(false);
        }
        let holders = self.repo.admin_holders().await?;
        let holds_admin = holders.contains(&user_id);
        let other_admins = holders.iter().filter(|id| **id != user_id).count();
        Ok(holds_admin && other_admins == 0)
    }
}
