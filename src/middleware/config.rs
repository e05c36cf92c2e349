use std::time::Duration;

use axum_extra::extract::cookie::Key;
use url::Url;

use crate::error::Error;
use crate::oauth::{OidcConfig, realm_issuer};
use crate::store::StoreConfig;
use crate::token::KeySource;

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) secure_cookies: bool,
    pub(crate) login_redirect: String,
    pub(crate) logout_redirect: String,
    pub(crate) required_role: String,
}

impl AuthSettings {
    fn defaults(cookie_key: Key) -> Self {
        Self {
            cookie_key,
            session_cookie_name: "nicegui_session".into(),
            secure_cookies: true,
            login_redirect: "/".into(),
            logout_redirect: "/".into(),
            required_role: "role2".into(),
        }
    }
}

/// Keycloak authentication configuration.
///
/// Required inputs (`oidc`, `cookie_key`) are constructor parameters.
///
/// Use [`from_env()`](AuthConfig::from_env) for convention-based setup,
/// or [`new()`](AuthConfig::new) with `with_*` methods for full control.
pub struct AuthConfig {
    pub(super) oidc: OidcConfig,
    pub(super) settings: AuthSettings,
    pub(super) store: StoreConfig,
    pub(super) key_source: Option<KeySource>,
}

impl AuthConfig {
    /// Create config with the required OIDC client settings and cookie key.
    ///
    /// Verification keys default to the provider's discovered JWKS.
    #[must_use]
    pub fn new(oidc: OidcConfig, cookie_key: Key) -> Self {
        Self {
            oidc,
            settings: AuthSettings::defaults(cookie_key),
            store: StoreConfig::default(),
            key_source: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Env vars
    /// - `KEYCLOAK_URL`: provider base reachable from this service (default `http://127.0.0.1:8080`)
    /// - `KEYCLOAK_EXTERNAL_URL`: provider base seen by browsers (default: `KEYCLOAK_URL`)
    /// - `KEYCLOAK_REALM` (default `test-realm`)
    /// - `KEYCLOAK_CLIENT_ID` (default `nicegui-app`)
    /// - `KEYCLOAK_CLIENT_SECRET`: unset for public clients
    /// - `OIDC_SCOPES`: comma-separated (default `openid,profile,email`)
    /// - `APP_BASE_URL`: callback is `{APP_BASE_URL}/auth` (default `http://localhost:8010`)
    /// - `HTTP_TIMEOUT_SECS`: per-call provider timeout (default 10)
    /// - `REQUIRED_ROLE`: role required by the protected API (default `role2`)
    /// - `COOKIE_KEY`: at least 64 bytes; required unless `DEV_MODE`
    /// - `DEV_MODE`: `"1"` or `"true"` allows an ephemeral cookie key and non-secure cookies
    /// - Store variables, see [`StoreConfig`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed values, or a missing/short
    /// `COOKIE_KEY` outside development mode.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`from_env`](Self::from_env) with an injectable variable source.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_owned())
        };

        let internal_base = var("KEYCLOAK_URL", "http://127.0.0.1:8080");
        let external_base = var("KEYCLOAK_EXTERNAL_URL", &internal_base);
        let realm = var("KEYCLOAK_REALM", "test-realm");
        let internal = realm_issuer(&internal_base, &realm)
            .map_err(|e| Error::Config(format!("KEYCLOAK_URL: {e}")))?;
        let external = realm_issuer(&external_base, &realm)
            .map_err(|e| Error::Config(format!("KEYCLOAK_EXTERNAL_URL: {e}")))?;

        let base_url = var("APP_BASE_URL", "http://localhost:8010");
        let redirect_uri: Url = format!("{}/auth", base_url.trim_end_matches('/'))
            .parse()
            .map_err(|e| Error::Config(format!("APP_BASE_URL: {e}")))?;

        let mut oidc = OidcConfig::new(var("KEYCLOAK_CLIENT_ID", "nicegui-app"), internal, redirect_uri)
            .with_external_issuer(external);
        if let Some(secret) = lookup("KEYCLOAK_CLIENT_SECRET").filter(|s| !s.is_empty()) {
            oidc = oidc.with_client_secret(secret);
        }
        if let Some(scopes) = lookup("OIDC_SCOPES") {
            let scopes: Vec<String> = scopes
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !scopes.is_empty() {
                oidc = oidc.with_scopes(scopes);
            }
        }
        if let Some(secs) = lookup("HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().ok().filter(|s| *s > 0).ok_or_else(|| {
                Error::Config(format!("HTTP_TIMEOUT_SECS: expected positive integer, got '{secs}'"))
            })?;
            oidc = oidc.with_http_timeout(Duration::from_secs(secs));
        }

        let dev_mode = matches!(lookup("DEV_MODE").as_deref(), Some("1" | "true"));

        let cookie_key = match lookup("COOKIE_KEY") {
            Some(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                Error::Config("COOKIE_KEY is set but invalid (must be at least 64 bytes)".into())
            })?,
            None if dev_mode => {
                tracing::warn!("COOKIE_KEY not set, using an ephemeral key (DEV_MODE)");
                Key::generate()
            }
            None => {
                return Err(Error::Config(
                    "COOKIE_KEY is required outside DEV_MODE (at least 64 bytes)".into(),
                ));
            }
        };

        let store = StoreConfig::from_lookup(&lookup)?;

        Ok(Self::new(oidc, cookie_key)
            .with_store_config(store)
            .with_secure_cookies(!dev_mode)
            .with_required_role(var("REQUIRED_ROLE", "role2")))
    }

    #[must_use]
    pub fn oidc(&self) -> &OidcConfig {
        &self.oidc
    }

    #[must_use]
    pub fn store_config(&self) -> &StoreConfig {
        &self.store
    }

    #[must_use]
    pub fn with_store_config(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Verify tokens with a fixed key instead of the discovered JWKS.
    #[must_use]
    pub fn with_key_source(mut self, keys: KeySource) -> Self {
        self.key_source = Some(keys);
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    /// Idle time after which a stored session reverts to anonymous.
    #[must_use]
    pub fn with_inactivity(mut self, inactivity: Duration) -> Self {
        self.store.inactivity = inactivity;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_login_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.login_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.logout_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_required_role(mut self, role: impl Into<String>) -> Self {
        self.settings.required_role = role.into();
        self
    }
}
