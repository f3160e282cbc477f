use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use ts_rs::TS;
use utoipa::ToSchema;

/// Role
///
/// The closed set of permission bundles a user can hold. Persisted as its lowercase name
/// in `role_mappings.user_role`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Editor,
    User,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Editor, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::User => "user",
        }
    }

    /// Parses a persisted role name. Unknown names yield `None` rather than an error.
    pub fn parse(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.as_str() == name)
    }
}

/// ProductFeature
///
/// A fine-grained capability checked by the Feature Gate. Never persisted; always derived
/// from roles through `ROLE_FEATURES`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ProductFeature {
    ManageUsers,
    ManageSettings,
    AddEditContent,
}

/// An effective feature set. Ordered so responses are deterministic.
pub type FeatureSet = BTreeSet<ProductFeature>;

/// ROLE_FEATURES
///
/// The static role → feature table. Adding a feature to a role is a one-line change here.
static ROLE_FEATURES: [(Role, &[ProductFeature]); 3] = [
    (
        Role::Admin,
        &[ProductFeature::ManageUsers, ProductFeature::ManageSettings],
    ),
    (Role::Editor, &[ProductFeature::AddEditContent]),
    (Role::User, &[]),
];

/// features_for_role
///
/// Pure lookup of the features a single role grants.
pub fn features_for_role(role: Role) -> FeatureSet {
    ROLE_FEATURES
        .iter()
        .find(|(candidate, _)| *candidate == role)
        .map(|(_, features)| features.iter().copied().collect())
        .unwrap_or_default()
}

/// Union of the features granted by every role in `roles`.
pub fn features_for_roles<'a, I>(roles: I) -> FeatureSet
where
    I: IntoIterator<Item = &'a Role>,
{
    roles
        .into_iter()
        .flat_map(|role| features_for_role(*role))
        .collect()
}
