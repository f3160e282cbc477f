use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, header};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "tp_session";

/// Payload key of the authenticated user id claim.
pub const USER_ID_KEY: &str = "user_id";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session token is invalid")]
    Invalid,

    #[error("session has expired")]
    Expired,

    #[error("session could not be encoded: {0}")]
    Encoding(String),

    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Session
///
/// A key-value payload with an expiry. The payload is free-form JSON; the only key the core
/// relies on is `USER_ID_KEY`.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub values: Map<String, Value>,
    pub expires_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh, unsaved session. It gets a real expiry on its first `save`.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            values: Map::new(),
            expires_at: Utc::now(),
        }
    }

    /// The user id claim, if present and an integer. Any other shape counts as malformed
    /// and yields `None`. Sign is not checked here.
    pub fn user_id(&self) -> Option<i64> {
        self.values.get(USER_ID_KEY).and_then(Value::as_i64)
    }

    pub fn set_user_id(&mut self, user_id: i64) {
        self.values.insert(USER_ID_KEY.to_string(), Value::from(user_id));
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// SessionStore Contract
///
/// Resolves opaque tokens to sessions. `save` slides the expiry window forward and returns
/// the token the client must present next; `expire` ends the session server-side.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, token: &str) -> Result<Session, SessionError>;

    async fn save(&self, session: &mut Session) -> Result<String, SessionError>;

    async fn expire(&self, session: &mut Session) -> Result<(), SessionError>;

    /// Lifetime granted by each `save`, in seconds.
    fn max_age_secs(&self) -> i64;
}

/// SessionState
///
/// The concrete type used to share the session store across the application state.
pub type SessionState = Arc<dyn SessionStore>;

// --- Signed cookie store ---

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sid: Uuid,
    #[serde(default)]
    values: Map<String, Value>,
    iat: i64,
    exp: i64,
}

/// SignedCookieStore
///
/// Keeps the whole session inside the cookie as an HS256-signed token. Nothing is stored
/// server-side, so `expire` only moves the expiry into the past; the gate then sends the
/// client a `Max-Age=0` cookie.
#[derive(Clone)]
pub struct SignedCookieStore {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    max_age_secs: i64,
}

impl SignedCookieStore {
    pub fn new(secret: &str, max_age_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            max_age_secs,
        }
    }
}

#[async_trait]
impl SessionStore for SignedCookieStore {
    async fn load(&self, token: &str) -> Result<Session, SessionError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid,
            },
        )?;

        let expires_at =
            DateTime::from_timestamp(data.claims.exp, 0).ok_or(SessionError::Invalid)?;

        Ok(Session {
            id: data.claims.sid,
            values: data.claims.values,
            expires_at,
        })
    }

    async fn save(&self, session: &mut Session) -> Result<String, SessionError> {
        let now = Utc::now();
        session.expires_at = now + Duration::seconds(self.max_age_secs);

        let claims = SessionClaims {
            sid: session.id,
            values: session.values.clone(),
            iat: now.timestamp(),
            exp: session.expires_at.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Encoding(e.to_string()))
    }

    async fn expire(&self, session: &mut Session) -> Result<(), SessionError> {
        session.expires_at = Utc::now() - Duration::seconds(1);
        Ok(())
    }

    fn max_age_secs(&self) -> i64 {
        self.max_age_secs
    }
}

// --- In-memory store ---

/// MemorySessionStore
///
/// Server-side sessions in a process-local map, keyed by the session id. Used by the
/// test-suite and single-process deployments; `expire` removes the entry so a later `load`
/// of the same token fails.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    max_age_secs: i64,
}

impl MemorySessionStore {
    pub fn new(max_age_secs: i64) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            max_age_secs,
        }
    }

    /// Whether a live session exists for `token`.
    pub async fn contains(&self, token: &str) -> bool {
        self.sessions
            .lock()
            .await
            .get(token)
            .is_some_and(|session| !session.is_expired())
    }

    /// Stores `session` as-is under its id, without touching its expiry. Lets callers seed
    /// arbitrary payloads.
    pub async fn insert(&self, session: Session) -> String {
        let token = session.id.to_string();
        self.sessions.lock().await.insert(token.clone(), session);
        token
    }

    pub async fn get(&self, token: &str) -> Option<Session> {
        self.sessions.lock().await.get(token).cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, token: &str) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(token) {
            Some(session) if !session.is_expired() => Ok(session.clone()),
            Some(_) => {
                sessions.remove(token);
                Err(SessionError::Expired)
            }
            None => Err(SessionError::Invalid),
        }
    }

    async fn save(&self, session: &mut Session) -> Result<String, SessionError> {
        session.expires_at = Utc::now() + Duration::seconds(self.max_age_secs);
        let token = session.id.to_string();
        self.sessions
            .lock()
            .await
            .insert(token.clone(), session.clone());
        Ok(token)
    }

    async fn expire(&self, session: &mut Session) -> Result<(), SessionError> {
        session.expires_at = Utc::now() - Duration::seconds(1);
        self.sessions.lock().await.remove(&session.id.to_string());
        Ok(())
    }

    fn max_age_secs(&self) -> i64 {
        self.max_age_secs
    }
}

// --- Cookie plumbing ---

/// session_token
///
/// Reads the session token from the request's `Cookie` headers.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

/// session_cookie
///
/// Builds the `Set-Cookie` value that hands `token` to the client for `max_age_secs`.
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| expired_session_cookie(secure))
}

/// expired_session_cookie
///
/// The `Set-Cookie` value that makes the client drop its session cookie.
pub fn expired_session_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static("tp_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure")
    } else {
        HeaderValue::from_static("tp_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}
