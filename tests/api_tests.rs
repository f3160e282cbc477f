mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use common::{PASSWORD, TestContext, body_json, request, set_cookie, token_from_set_cookie};
use serde_json::{Value, json};
use tinypress::create_router;
use tower::ServiceExt;

async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

/// Runs first-time setup and returns the administrator's id and session token.
async fn set_up_site(app: &Router) -> (i64, String) {
    let response = send(
        app,
        request(
            "POST",
            "/setup",
            None,
            Some(json!({
                "site_name": "Tinypress",
                "display_name": "Owner",
                "email": "owner@example.com",
                "username": "owner",
                "password": PASSWORD,
            })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let token = token_from_set_cookie(&set_cookie(response.headers()).unwrap());
    let body = body_json(response).await;
    (body["id"].as_i64().unwrap(), token)
}

fn user_payload(username: &str, roles: Value) -> Value {
    json!({
        "display_name": username,
        "email": format!("{username}@example.com"),
        "username": username,
        "password": PASSWORD,
        "roles": roles,
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let ctx = TestContext::new();
    let app = create_router(ctx.state.clone());

    let response = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_setup_then_editing_flow() {
    let ctx = TestContext::new();
    let app = create_router(ctx.state.clone());
    let (admin_id, admin) = set_up_site(&app).await;

    let session =
        body_json(send(&app, request("GET", "/account/session", Some(&admin), None)).await).await;
    assert_eq!(session["user_id"], admin_id);
    assert_eq!(session["allowed_features"], json!(["manage_users", "manage_settings"]));

    // Setup only works once.
    let again = send(
        &app,
        request(
            "POST",
            "/setup",
            None,
            Some(json!({
                "site_name": "Other",
                "display_name": "Intruder",
                "email": "intruder@example.com",
                "username": "intruder",
                "password": PASSWORD,
            })),
        ),
    )
    .await;
    assert_eq!(again.status(), StatusCode::FORBIDDEN);

    // The administrator hires an editor, who signs in and does the writing.
    let created = send(
        &app,
        request(
            "POST",
            "/admin/users",
            Some(&admin),
            Some(user_payload("writer", json!(["editor"]))),
        ),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let signed_in = send(
        &app,
        request(
            "POST",
            "/sign-in",
            None,
            Some(json!({"username": "WRITER", "password": PASSWORD})),
        ),
    )
    .await;
    assert_eq!(signed_in.status(), StatusCode::OK);
    let editor = token_from_set_cookie(&set_cookie(signed_in.headers()).unwrap());

    let page = send(
        &app,
        request(
            "POST",
            "/pages",
            Some(&editor),
            Some(json!({
                "title": "Welcome",
                "rendered_html": "<h1>Hi</h1>",
                "editor_content": "{}",
            })),
        ),
    )
    .await;
    assert_eq!(page.status(), StatusCode::CREATED);
    let page_id = body_json(page).await["id"].as_i64().unwrap();

    let duplicate = send(
        &app,
        request("POST", "/pages", Some(&editor), Some(json!({"title": "Welcome"}))),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let draft = send(
        &app,
        request(
            "POST",
            &format!("/pages/{page_id}/drafts"),
            Some(&editor),
            Some(json!({"rendered_html": "<h1>Hello</h1>", "editor_content": "{\"v\":2}"})),
        ),
    )
    .await;
    assert_eq!(draft.status(), StatusCode::CREATED);
    let draft_id = body_json(draft).await["id"].as_i64().unwrap();

    let published = send(
        &app,
        request("POST", &format!("/drafts/{draft_id}/publish"), Some(&editor), None),
    )
    .await;
    assert_eq!(published.status(), StatusCode::NO_CONTENT);

    let fetched = body_json(
        send(&app, request("GET", &format!("/pages/{page_id}"), Some(&editor), None)).await,
    )
    .await;
    assert_eq!(fetched["page"]["published_revision_id"], draft_id);
    assert_eq!(fetched["draft"]["rendered_html"], "<h1>Hello</h1>");

    let listed = body_json(
        send(&app, request("GET", "/pages?page=0&per_page=5", Some(&editor), None)).await,
    )
    .await;
    assert_eq!(listed["total_count"], 1);
    assert_eq!(listed["pages"][0]["title"], "Welcome");

    // Editors cannot manage users.
    let forbidden = send(&app, request("GET", "/admin/users", Some(&editor), None)).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sign_in_failure_does_not_set_cookie() {
    let ctx = TestContext::new();
    let app = create_router(ctx.state.clone());
    set_up_site(&app).await;

    let response = send(
        &app,
        request(
            "POST",
            "/sign-in",
            None,
            Some(json!({"username": "owner", "password": "wrong"})),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(response.headers()).is_none());
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_admin_user_management_policies() {
    let ctx = TestContext::new();
    let app = create_router(ctx.state.clone());
    let (admin_id, admin) = set_up_site(&app).await;

    // Stripping admin from the only administrator is refused.
    let demote = send(
        &app,
        request(
            "PUT",
            &format!("/admin/users/{admin_id}"),
            Some(&admin),
            Some(json!({
                "display_name": "Owner",
                "email": "owner@example.com",
                "username": "owner",
                "roles": ["editor"],
            })),
        ),
    )
    .await;
    assert_eq!(demote.status(), StatusCode::FORBIDDEN);

    let delete_self = send(
        &app,
        request("DELETE", &format!("/admin/users/{admin_id}"), Some(&admin), None),
    )
    .await;
    assert_eq!(delete_self.status(), StatusCode::FORBIDDEN);
    let body = body_json(delete_self).await;
    assert_eq!(body["error"], "You can't delete the user you are logged in as.");

    let created = send(
        &app,
        request(
            "POST",
            "/admin/users",
            Some(&admin),
            Some(user_payload("helper", json!(["user"]))),
        ),
    )
    .await;
    let helper_id = body_json(created).await["id"].as_i64().unwrap();

    let fetched = body_json(
        send(&app, request("GET", &format!("/admin/users/{helper_id}"), Some(&admin), None)).await,
    )
    .await;
    assert_eq!(fetched["roles"], json!(["user"]));

    let listed =
        body_json(send(&app, request("GET", "/admin/users", Some(&admin), None)).await).await;
    assert_eq!(listed["page_count"], 1);
    assert_eq!(listed["users"].as_array().unwrap().len(), 2);

    let deleted = send(
        &app,
        request("DELETE", &format!("/admin/users/{helper_id}"), Some(&admin), None),
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = send(
        &app,
        request("GET", &format!("/admin/users/{helper_id}"), Some(&admin), None),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
