use axum::extract::{Query, State};
use axum::http::{StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use super::cookies;
use super::error::AuthError;
use super::extractor::{BearerIdentity, SessionUser};
use super::state::AuthState;
use crate::gate::authorize;
use crate::session::{Session, SessionView};
use crate::store::SessionStore;
use crate::types::SessionId;

/// Browser-facing login routes: `/login`, the callback, `/logout` and `/session`.
///
/// The callback is mounted at the path of the configured redirect URI.
pub fn auth_routes<S: SessionStore>(state: AuthState<S>) -> Router {
    let callback_path = callback_path(&state);

    Router::new()
        .route("/login", get(login::<S>))
        .route(&callback_path, get(callback::<S>))
        .route("/logout", get(logout::<S>).post(logout::<S>))
        .route("/session", get(session_view::<S>))
        .with_state(state)
}

/// Bearer-protected API routes: `/hello`.
pub fn api_routes<S: SessionStore>(state: AuthState<S>) -> Router {
    Router::new()
        .route("/hello", get(hello::<S>))
        .with_state(state)
}

/// [`auth_routes`] and [`api_routes`] on one router.
pub fn router<S: SessionStore>(state: AuthState<S>) -> Router {
    auth_routes(state.clone()).merge(api_routes(state))
}

fn callback_path<S>(state: &AuthState<S>) -> String {
    state.flow.client().config().redirect_uri().path().to_owned()
}

// ── Login ──────────────────────────────────────────────────────────

async fn login<S: SessionStore>(
    State(state): State<AuthState<S>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Response) {
    let request = state.flow.client().authorization_request();

    let (pkce_cookie, state_cookie) = cookies::pkce_cookies(
        &request.pkce.verifier,
        &request.state,
        state.settings.secure_cookies,
        &callback_path(&state),
    );

    tracing::debug!(url = %request.url, "Redirecting to identity provider");
    (jar.add(pkce_cookie).add(state_cookie), found(request.url.as_str()))
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Always lands on the login redirect. Failures leave any existing session
/// untouched and are only logged.
async fn callback<S: SessionStore>(
    State(state): State<AuthState<S>>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> (PrivateCookieJar, Response) {
    let stored_state = cookies::get_state(&jar);
    let code_verifier = cookies::get_pkce_verifier(&jar);
    let jar = cookies::clear_pkce_cookies(jar, &callback_path(&state));
    let landing = found(&state.settings.login_redirect);

    if let Some(error) = &params.error {
        let desc = params.error_description.as_deref().unwrap_or("Unknown error");
        tracing::warn!(stage = "authorize", error = %error, description = %desc, "Provider returned an error");
        return (jar, landing);
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::warn!(stage = "authorize", "Callback without authorization code");
        return (jar, landing);
    };

    match (params.state.as_deref(), stored_state.as_deref()) {
        (Some(received), Some(stored)) if received == stored => {}
        _ => {
            tracing::warn!(stage = "state", "OAuth state mismatch");
            return (jar, landing);
        }
    }

    // failures are logged by the flow, tagged with the failing stage
    let Ok(session) = state.flow.complete(&code, code_verifier.as_deref()).await else {
        return (jar, landing);
    };

    let previous = cookies::session_id(&jar, &state.settings.session_cookie_name);
    let session_id = SessionId::generate();
    let username = session.username.clone();

    if let Err(e) = state.store.put(&session_id, session.into()).await {
        tracing::error!(stage = "store", error = %e, "Session write failed");
        return (jar, landing);
    }

    if let Some(previous) = previous
        && let Err(e) = state.store.clear(&previous).await
    {
        tracing::warn!(session_id = %previous, error = %e, "Could not clear previous session");
    }

    let session_cookie = cookies::session_cookie(
        &state.settings.session_cookie_name,
        &session_id,
        state.settings.secure_cookies,
    );

    tracing::info!(session_id = %session_id, username = %username, "Session established");
    (jar.add(session_cookie), landing)
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<S: SessionStore>(
    State(state): State<AuthState<S>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Response) {
    if let Some(session_id) = cookies::session_id(&jar, &state.settings.session_cookie_name)
        && let Err(e) = state.logout.logout(&session_id).await
    {
        tracing::warn!(session_id = %session_id, error = %e, "Session clearing failed during logout");
    }

    let clear_cookie = cookies::clear_session_cookie(&state.settings.session_cookie_name);
    (jar.remove(clear_cookie), found(&state.settings.logout_redirect))
}

// ── Session ────────────────────────────────────────────────────────

async fn session_view<S: SessionStore>(
    user: Result<SessionUser, AuthError>,
) -> Result<Json<SessionView>, AuthError> {
    match user {
        Ok(user) => Ok(Json(user.session.view())),
        Err(AuthError::Unauthenticated | AuthError::SessionExpired) => {
            Ok(Json(SessionView::from(&Session::Anonymous)))
        }
        Err(e) => Err(e),
    }
}

// ── API ────────────────────────────────────────────────────────────

async fn hello<S: SessionStore>(
    State(state): State<AuthState<S>>,
    BearerIdentity(identity): BearerIdentity,
) -> Result<Json<JsonValue>, AuthError> {
    authorize(&identity, &state.settings.required_role).into_result()?;

    let username = identity.preferred_username.as_deref().unwrap_or("User");
    Ok(Json(json!({
        "message": format!("Hello {username}!"),
        "decoded_token": identity.claims,
    })))
}

// ── Helpers ────────────────────────────────────────────────────────

/// `302 Found` to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_owned())]).into_response()
}
