use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    roles::{FeatureSet, ProductFeature},
    session::{SessionError, expired_session_cookie, session_cookie, session_token},
};

/// AuthUser
///
/// The identity the session gate attached to the request: the user id plus the feature set
/// computed for it on this request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub features: FeatureSet,
}

impl AuthUser {
    pub fn can(&self, feature: ProductFeature) -> bool {
        self.features.contains(&feature)
    }
}

/// AuthUser Extractor Implementation
///
/// Reads the identity from the request extensions. It is only present behind
/// `require_session`; anywhere else the extractor rejects with 401.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// Authentication
///
/// The typed outcome of running the session gate over one request.
#[derive(Debug, Clone)]
pub enum Authentication {
    /// `session_expired` is set when a session was presented but rejected, so the client
    /// should be told to drop its cookie.
    Unauthenticated { session_expired: bool },
    /// `session_token` is the refreshed token to hand back to the client.
    Authenticated {
        user: AuthUser,
        session_token: String,
    },
}

/// authenticate
///
/// Resolves a session token to an identity:
/// 1. Unknown, forged or expired tokens are unauthenticated.
/// 2. A missing, malformed or non-positive user id claim expires the session.
/// 3. A user that no longer exists (e.g. deleted since sign-in) also expires the session.
/// 4. Otherwise the features are computed and the session is re-saved, sliding its expiry.
///
/// Only session-store and storage failures are errors.
pub async fn authenticate(state: &AppState, token: Option<&str>) -> AppResult<Authentication> {
    let Some(token) = token else {
        return Ok(Authentication::Unauthenticated {
            session_expired: false,
        });
    };

    let mut session = match state.sessions.load(token).await {
        Ok(session) => session,
        Err(SessionError::Invalid | SessionError::Expired) => {
            tracing::debug!("rejected unknown or expired session token");
            return Ok(Authentication::Unauthenticated {
                session_expired: true,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let user_id = match session.user_id() {
        Some(id) if id >= 1 => id,
        claim => {
            tracing::warn!(session_id = %session.id, ?claim, "session has no valid user id claim");
            state.sessions.expire(&mut session).await?;
            return Ok(Authentication::Unauthenticated {
                session_expired: true,
            });
        }
    };

    if state.repo.find_user(user_id).await?.is_none() {
        tracing::warn!(user_id, "session refers to a missing user");
        state.sessions.expire(&mut session).await?;
        return Ok(Authentication::Unauthenticated {
            session_expired: true,
        });
    }

    let features = state.authz().features_for_user(user_id).await?;
    let session_token = state.sessions.save(&mut session).await?;

    Ok(Authentication::Authenticated {
        user: AuthUser { user_id, features },
        session_token,
    })
}

/// require_session
///
/// The session authentication gate. On success the `AuthUser` is attached to the request and
/// the refreshed session cookie is set on the response, unless the handler already set one
/// (sign-out). On rejection it answers 401, clearing the cookie of a rejected session.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let secure = state.config.secure_cookies();
    let token = session_token(request.headers());

    match authenticate(&state, token.as_deref()).await {
        Ok(Authentication::Authenticated {
            user,
            session_token,
        }) => {
            request.extensions_mut().insert(user);
            let mut response = next.run(request).await;
            if !response.headers().contains_key(header::SET_COOKIE) {
                let cookie = session_cookie(&session_token, state.sessions.max_age_secs(), secure);
                response.headers_mut().insert(header::SET_COOKIE, cookie);
            }
            response
        }
        Ok(Authentication::Unauthenticated { session_expired }) => {
            let mut response = AppError::Unauthorized.into_response();
            if session_expired {
                response
                    .headers_mut()
                    .insert(header::SET_COOKIE, expired_session_cookie(secure));
            }
            response
        }
        Err(e) => e.into_response(),
    }
}

/// FeatureGate
///
/// State for `require_feature`: the application state plus the one feature a route group
/// requires.
#[derive(Clone)]
pub struct FeatureGate {
    pub state: AppState,
    pub feature: ProductFeature,
}

impl FeatureGate {
    pub fn new(state: AppState, feature: ProductFeature) -> Self {
        Self { state, feature }
    }
}

/// require_feature
///
/// Recomputes the user's features instead of trusting the set attached by the session gate,
/// so role changes apply on the very next request. Answers 403 when the feature is missing.
pub async fn require_feature(
    State(gate): State<FeatureGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(user_id) = request.extensions().get::<AuthUser>().map(|u| u.user_id) else {
        return AppError::Unauthorized.into_response();
    };

    let features = match gate.state.authz().features_for_user(user_id).await {
        Ok(features) => features,
        Err(e) => return e.into_response(),
    };

    if !features.contains(&gate.feature) {
        tracing::debug!(user_id, feature = ?gate.feature, "feature not allowed");
        return AppError::Forbidden.into_response();
    }

    request
        .extensions_mut()
        .insert(AuthUser { user_id, features });
    next.run(request).await
}
