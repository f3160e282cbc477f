mod common;

use common::{PASSWORD, TestContext};
use std::collections::BTreeSet;
use tinypress::{
    AppError, CreateUserOutcome, StoreError,
    models::{CreateUserRequest, SiteSetupRequest, UpdateUserRequest},
    repository::Repository,
    roles::Role,
};

fn create_request(username: &str, roles: Vec<Role>) -> CreateUserRequest {
    CreateUserRequest {
        display_name: format!(" {username} "),
        email: format!("{}@Example.com", username.to_uppercase()),
        username: format!("  {}  ", username.to_uppercase()),
        password: PASSWORD.to_string(),
        roles,
    }
}

fn update_request(username: &str, roles: Vec<Role>) -> UpdateUserRequest {
    UpdateUserRequest {
        display_name: "Renamed".to_string(),
        email: format!("{username}@example.com"),
        username: username.to_string(),
        roles,
    }
}

#[tokio::test]
async fn test_create_user_normalizes_and_assigns_roles() {
    let ctx = TestContext::new();
    let outcome = ctx
        .state
        .users()
        .create_user(create_request("alice", vec![Role::Editor, Role::Editor]))
        .await
        .unwrap();
    let CreateUserOutcome::Created(id) = outcome else {
        panic!("expected a new user");
    };

    let user = ctx.repo.find_user(id).await.unwrap().unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.email, "alice@example.com");
    assert_eq!(user.display_name, "alice");
    assert!(user.password_hash.starts_with("$argon2id$"));

    let summary = ctx.state.users().get_user(id).await.unwrap();
    assert_eq!(summary.roles, vec![Role::Editor]);
}

#[tokio::test]
async fn test_create_user_duplicate_username() {
    let ctx = TestContext::new();
    ctx.seed_user("bob", &[Role::User]).await;

    let outcome = ctx
        .state
        .users()
        .create_user(create_request("bob", vec![]))
        .await
        .unwrap();
    assert_eq!(outcome, CreateUserOutcome::Duplicate);
    assert_eq!(ctx.repo.count_users().await.unwrap(), 1);
}

#[tokio::test]
async fn test_create_user_rolls_back_when_roles_fail() {
    let ctx = TestContext::new();
    ctx.repo.set_failing_role_writes(true);

    let result = ctx
        .state
        .users()
        .create_user(create_request("erin", vec![Role::Editor]))
        .await;
    assert!(matches!(
        result,
        Err(AppError::Storage(StoreError::Unavailable(_)))
    ));
    assert_eq!(ctx.repo.count_users().await.unwrap(), 0);
    assert!(ctx.repo.find_user_by_username("erin").await.unwrap().is_none());

    // Nothing was left behind to block a retry under the same name.
    ctx.repo.set_failing_role_writes(false);
    let retry = ctx
        .state
        .users()
        .create_user(create_request("erin", vec![Role::Editor]))
        .await
        .unwrap();
    assert!(matches!(retry, CreateUserOutcome::Created(_)));
}

#[tokio::test]
async fn test_list_users_pages_newest_first() {
    let ctx = TestContext::new();
    let mut ids = Vec::new();
    for n in 0..12 {
        ids.push(ctx.seed_user(&format!("user{n}"), &[Role::User]).await);
    }

    let (first, page_count) = ctx.state.users().list_users(0).await.unwrap();
    assert_eq!(page_count, 2);
    assert_eq!(first.len(), 10);
    assert_eq!(first[0].id, ids[11]);
    assert_eq!(first[0].roles, vec![Role::User]);

    let (second, _) = ctx.state.users().list_users(1).await.unwrap();
    assert_eq!(
        second.iter().map(|u| u.id).collect::<Vec<_>>(),
        vec![ids[1], ids[0]]
    );
}

#[tokio::test]
async fn test_get_missing_user_is_not_found() {
    let ctx = TestContext::new();
    let result = ctx.state.users().get_user(77).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_removing_last_admin_is_rejected_before_any_write() {
    let ctx = TestContext::new();
    let admin = ctx.seed_user("root", &[Role::Admin]).await;

    let result = ctx
        .state
        .users()
        .update_user(admin, update_request("renamed", vec![Role::Editor]))
        .await;
    assert!(matches!(result, Err(AppError::PolicyViolation(_))));

    let roles: BTreeSet<Role> = ctx.state.authz().roles_for_user(admin).await.unwrap();
    assert_eq!(roles, [Role::Admin].into_iter().collect());
    let user = ctx.repo.find_user(admin).await.unwrap().unwrap();
    assert_eq!(user.username, "root");
}

#[tokio::test]
async fn test_update_user_profile_and_roles() {
    let ctx = TestContext::new();
    ctx.seed_user("root", &[Role::Admin]).await;
    let editor = ctx.seed_user("ed", &[Role::Editor]).await;

    ctx.state
        .users()
        .update_user(editor, update_request("EdWard", vec![Role::User, Role::Editor]))
        .await
        .unwrap();

    let summary = ctx.state.users().get_user(editor).await.unwrap();
    assert_eq!(summary.username, "edward");
    assert_eq!(summary.display_name, "Renamed");
    assert_eq!(summary.roles, vec![Role::Editor, Role::User]);
}

#[tokio::test]
async fn test_update_user_rolls_back_when_roles_fail() {
    let ctx = TestContext::new();
    ctx.seed_user("root", &[Role::Admin]).await;
    let bob = ctx.seed_user("bob", &[Role::User]).await;
    ctx.repo.set_failing_role_writes(true);

    let result = ctx
        .state
        .users()
        .update_user(bob, update_request("robert", vec![Role::Editor]))
        .await;
    assert!(matches!(
        result,
        Err(AppError::Storage(StoreError::Unavailable(_)))
    ));

    let user = ctx.repo.find_user(bob).await.unwrap().unwrap();
    assert_eq!(user.username, "bob");
    assert_eq!(user.display_name, "bob display");
    assert_eq!(ctx.repo.roles_for_user(bob).await.unwrap(), vec!["user"]);
}

#[tokio::test]
async fn test_update_user_username_collision_is_conflict() {
    let ctx = TestContext::new();
    ctx.seed_user("root", &[Role::Admin]).await;
    let carol = ctx.seed_user("carol", &[Role::User]).await;

    let result = ctx
        .state
        .users()
        .update_user(carol, update_request("root", vec![Role::User]))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_delete_self_is_rejected() {
    let ctx = TestContext::new();
    let admin = ctx.seed_user("root", &[Role::Admin]).await;

    let result = ctx.state.users().delete_user(admin, admin).await;
    assert!(matches!(result, Err(AppError::PolicyViolation(_))));
    assert!(ctx.repo.find_user(admin).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_user_is_soft() {
    let ctx = TestContext::new();
    let admin = ctx.seed_user("root", &[Role::Admin]).await;
    let victim = ctx.seed_user("victim", &[Role::Editor]).await;

    ctx.state.users().delete_user(admin, victim).await.unwrap();

    assert!(ctx.repo.find_user(victim).await.unwrap().is_none());
    // Mappings survive the tombstone.
    assert_eq!(ctx.repo.roles_for_user(victim).await.unwrap(), vec!["editor"]);
    // The username is free again.
    ctx.seed_user("victim", &[]).await;

    let again = ctx.state.users().delete_user(admin, victim).await;
    assert!(matches!(again, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_check_credentials() {
    let ctx = TestContext::new();
    let id = ctx.seed_user("dave", &[Role::User]).await;
    let users = ctx.state.users();

    let user = users.check_credentials("  DAVE ", PASSWORD).await.unwrap();
    assert_eq!(user.map(|u| u.id), Some(id));

    assert!(users.check_credentials("dave", "wrong").await.unwrap().is_none());
    assert!(users.check_credentials("nobody", PASSWORD).await.unwrap().is_none());
}

#[tokio::test]
async fn test_setup_site_creates_first_admin_once() {
    let ctx = TestContext::new();
    let request = SiteSetupRequest {
        site_name: "My Site".to_string(),
        display_name: "Owner".to_string(),
        email: "owner@example.com".to_string(),
        username: "Owner".to_string(),
        password: PASSWORD.to_string(),
    };

    let user_id = ctx.state.users().setup_site(request.clone()).await.unwrap();
    assert!(ctx.repo.site_exists().await.unwrap());
    assert_eq!(ctx.repo.admin_holders().await.unwrap(), vec![user_id]);

    let again = ctx.state.users().setup_site(request).await;
    assert!(matches!(again, Err(AppError::PolicyViolation(_))));
    assert_eq!(ctx.repo.count_users().await.unwrap(), 1);
}
