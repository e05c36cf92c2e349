//! Server-side session record.
//!
//! A session is either anonymous or fully authenticated; there is no
//! representable in-between, so a failed login can never leave a
//! half-written record behind.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::oauth::{TokenSet, UserProfile};
use crate::token::ValidatedIdentity;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated(AuthenticatedSession),
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub fn authenticated(&self) -> Option<&AuthenticatedSession> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.authenticated()
            .and_then(|s| s.tokens.refresh_token.as_deref())
    }
}

impl From<AuthenticatedSession> for Session {
    fn from(session: AuthenticatedSession) -> Self {
        Self::Authenticated(session)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub roles: BTreeSet<String>,
    pub tokens: SessionTokens,
}

impl AuthenticatedSession {
    /// Build the record from a completed exchange.
    ///
    /// Profile fields come from userinfo; roles come from the verified
    /// access token. The username falls back to the token's
    /// `preferred_username` when userinfo omits it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserInfoFailed`] if no username is available from
    /// either source.
    pub fn compose(
        tokens: TokenSet,
        profile: UserProfile,
        identity: &ValidatedIdentity,
    ) -> Result<Self, Error> {
        let username = profile
            .preferred_username
            .or_else(|| identity.preferred_username.clone())
            .ok_or_else(|| Error::UserInfoFailed("no preferred_username in profile or token".into()))?;

        Ok(Self {
            username,
            email: profile.email,
            first_name: profile.given_name,
            last_name: profile.family_name,
            phone_number: profile.phone_number,
            roles: identity.roles.clone(),
            tokens: SessionTokens {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
        })
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            authenticated: true,
            username: Some(self.username.clone()),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone_number: self.phone_number.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// Provider tokens. Never rendered by `Debug` and never part of [`SessionView`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// What the UI layer is allowed to see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub authenticated: bool,
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub roles: BTreeSet<String>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        session
            .authenticated()
            .map(AuthenticatedSession::view)
            .unwrap_or_default()
    }
}
