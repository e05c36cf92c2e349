use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::{AuthConfig, AuthSettings};
use crate::discovery::ProviderDiscovery;
use crate::error::Error;
use crate::flow::LoginFlow;
use crate::logout::LogoutCoordinator;
use crate::oauth::AuthClient;
use crate::store::SessionStore;
use crate::token::{KeySource, TokenValidator};

/// Shared state for auth route handlers and extractors.
pub struct AuthState<S> {
    pub(super) flow: LoginFlow,
    pub(super) logout: LogoutCoordinator<S>,
    pub(super) store: Arc<S>,
    pub(super) settings: AuthSettings,
}

// Manual Clone: avoid derive adding an `S: Clone` bound.
impl<S> Clone for AuthState<S> {
    fn clone(&self) -> Self {
        Self {
            flow: self.flow.clone(),
            logout: self.logout.clone(),
            store: self.store.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: SessionStore> AuthState<S> {
    /// Wire the client, validator and logout coordinator around `store`.
    ///
    /// No network call is made here; provider metadata is fetched on the
    /// first token validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: AuthConfig, store: S) -> Result<Self, Error> {
        let AuthConfig {
            oidc,
            settings,
            key_source,
            ..
        } = config;

        let issuers = oidc.expected_issuers();
        let client = Arc::new(AuthClient::new(oidc)?);
        let keys = key_source.unwrap_or_else(|| {
            KeySource::Discovered(Arc::new(ProviderDiscovery::new(
                client.http().clone(),
                client.config().internal_issuer(),
            )))
        });
        let validator = Arc::new(TokenValidator::new(keys, issuers));
        let store = Arc::new(store);

        Ok(Self {
            flow: LoginFlow::new(Arc::clone(&client), validator),
            logout: LogoutCoordinator::new(client, Arc::clone(&store)),
            store,
            settings,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        self.flow.validator()
    }

    #[must_use]
    pub fn client(&self) -> &AuthClient {
        self.flow.client()
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<S> FromRef<AuthState<S>> for Key {
    fn from_ref(state: &AuthState<S>) -> Self {
        state.settings.cookie_key.clone()
    }
}
