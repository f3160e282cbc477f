#![allow(dead_code)]

use axum::{
    body::Body,
    http::{HeaderMap, Request, Response, header},
};
use std::{collections::BTreeSet, sync::Arc};
use tinypress::{
    AppConfig, AppState,
    models::NewUser,
    password::PasswordHasher,
    repository::{MemoryRepository, Repository, RepositoryState},
    roles::Role,
    session::{MemorySessionStore, SESSION_COOKIE, Session, SessionState, SessionStore},
};

pub const PASSWORD: &str = "hunter22";

/// In-memory application state plus typed handles on its stores.
pub struct TestContext {
    pub state: AppState,
    pub repo: Arc<MemoryRepository>,
    pub sessions: Arc<MemorySessionStore>,
}

impl TestContext {
    pub fn new() -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let sessions = Arc::new(MemorySessionStore::new(3600));
        let state = AppState {
            repo: repo.clone() as RepositoryState,
            sessions: sessions.clone() as SessionState,
            config: AppConfig::default(),
        };
        Self {
            state,
            repo,
            sessions,
        }
    }

    /// Inserts a live user with `roles` and the shared test password.
    pub async fn seed_user(&self, username: &str, roles: &[Role]) -> i64 {
        let password_hash = PasswordHasher::new(8).hash(PASSWORD).unwrap();
        let roles: BTreeSet<Role> = roles.iter().copied().collect();
        let user = NewUser {
            display_name: format!("{username} display"),
            email: format!("{username}@example.com"),
            username: username.to_string(),
            password_hash,
        };
        self.repo.create_user_with_roles(user, &roles).await.unwrap()
    }

    /// A saved session for `user_id`; returns its token.
    pub async fn session_for(&self, user_id: i64) -> String {
        let mut session = Session::new();
        session.set_user_id(user_id);
        self.sessions.save(&mut session).await.unwrap()
    }

    /// A saved session carrying an arbitrary payload under the user id key.
    pub async fn session_with_claim(&self, claim: serde_json::Value) -> String {
        let mut session = Session::new();
        session
            .values
            .insert(tinypress::session::USER_ID_KEY.to_string(), claim);
        self.sessions.save(&mut session).await.unwrap()
    }
}

pub fn cookie_header(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}")
}

pub fn request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, cookie_header(token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn set_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The token carried by a `Set-Cookie` value.
pub fn token_from_set_cookie(value: &str) -> String {
    value
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, token)| token.to_string())
        .unwrap()
}
