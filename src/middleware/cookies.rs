use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::types::SessionId;

const PKCE_COOKIE_NAME: &str = "kc_pkce";
const STATE_COOKIE_NAME: &str = "kc_state";
const PENDING_LOGIN_TTL: time::Duration = time::Duration::minutes(5);

/// Create PKCE verifier + state cookies for the authorization request.
///
/// Both are scoped to the callback path so they only travel back on `/auth`.
pub(super) fn pkce_cookies(
    code_verifier: &str,
    state: &str,
    secure: bool,
    callback_path: &str,
) -> (Cookie<'static>, Cookie<'static>) {
    let pending = |name: &'static str, value: &str| {
        Cookie::build((name, value.to_string()))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .path(callback_path.to_string())
            .max_age(PENDING_LOGIN_TTL)
            .build()
    };
    (
        pending(PKCE_COOKIE_NAME, code_verifier),
        pending(STATE_COOKIE_NAME, state),
    )
}

/// Drop the PKCE verifier + state cookies.
pub(super) fn clear_pkce_cookies(jar: PrivateCookieJar, callback_path: &str) -> PrivateCookieJar {
    let removal = |name: &'static str| {
        Cookie::build((name, ""))
            .path(callback_path.to_string())
            .build()
    };
    jar.remove(removal(PKCE_COOKIE_NAME))
        .remove(removal(STATE_COOKIE_NAME))
}

/// Create session cookie.
///
/// A browser-session cookie with no `Max-Age`: the store's sliding
/// inactivity window decides when the session ends.
pub(super) fn session_cookie(name: &str, session_id: &SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), session_id.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .build()
}

/// Create removal cookie for session.
pub(super) fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .build()
}

pub(super) fn session_id(jar: &PrivateCookieJar, name: &str) -> Option<SessionId> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .map(SessionId::from)
}

pub(super) fn get_pkce_verifier(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(PKCE_COOKIE_NAME).map(|c| c.value().to_string())
}

pub(super) fn get_state(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(STATE_COOKIE_NAME).map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_login_cookies_are_scoped_and_short_lived() {
        let (verifier, state) = pkce_cookies("v", "s", true, "/auth");
        for cookie in [&verifier, &state] {
            assert_eq!(cookie.path(), Some("/auth"));
            assert_eq!(cookie.max_age(), Some(time::Duration::minutes(5)));
            assert_eq!(cookie.http_only(), Some(true));
            assert_eq!(cookie.secure(), Some(true));
            assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        }
        assert_eq!(verifier.value(), "v");
        assert_eq!(state.value(), "s");
    }

    #[test]
    fn session_cookie_leaves_expiry_to_the_store() {
        let id = SessionId::from("01J0000000000000000000000");
        let cookie = session_cookie("nicegui_session", &id, false);
        assert_eq!(cookie.name(), "nicegui_session");
        assert_eq!(cookie.value(), id.as_str());
        assert_eq!(cookie.max_age(), None);
        assert_eq!(cookie.expires(), None);
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.path(), Some("/"));
    }
}
