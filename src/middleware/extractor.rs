use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::Key;

use super::cookies;
use super::error::AuthError;
use super::state::AuthState;
use crate::session::{AuthenticatedSession, Session};
use crate::store::SessionStore;
use crate::token::ValidatedIdentity;
use crate::types::SessionId;

/// Identity from a freshly validated `Authorization: Bearer` token.
///
/// Every request is validated again; nothing is cached. Missing
/// credentials reject with `401 Not authenticated`, invalid ones with
/// `401 Invalid authentication credentials: <reason>`.
///
/// # Example
///
/// ```rust,ignore
/// async fn api(BearerIdentity(identity): BearerIdentity) -> impl IntoResponse {
///     authorize(&identity, "role2").into_result()?;
///     ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BearerIdentity(pub ValidatedIdentity);

impl<S: SessionStore> FromRequestParts<AuthState<S>> for BearerIdentity {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState<S>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::Unauthenticated)?;
        let identity = state.validator().validate(token).await?;
        Ok(Self(identity))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Authenticated user resolved from the session cookie.
///
/// Rejects with `401 Not authenticated` when there is no session cookie
/// and `401 Session expired` when the cookie names a session that is no
/// longer authenticated. Roles are as stored at login.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub session_id: SessionId,
    pub session: AuthenticatedSession,
}

impl<S: SessionStore> FromRequestParts<AuthState<S>> for SessionUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState<S>,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar<Key> = PrivateCookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::Unauthenticated)?;

        let session_id = cookies::session_id(&jar, &state.settings.session_cookie_name)
            .ok_or(AuthError::Unauthenticated)?;

        match state.store.get(&session_id).await.map_err(crate::Error::from)? {
            Session::Authenticated(session) => Ok(Self {
                session_id,
                session,
            }),
            Session::Anonymous => Err(crate::Error::SessionExpired.into()),
        }
    }
}
