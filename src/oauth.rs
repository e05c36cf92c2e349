use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::pkce::{self, PkcePair};

/// Keycloak realm and client settings.
///
/// Required fields are constructor parameters; everything else has a
/// development default and a `with_*` override.
///
/// ```rust,ignore
/// use keycloak_session::OidcConfig;
///
/// let issuer = keycloak_session::oauth::realm_issuer("http://keycloak:8080", "test-realm")?;
/// let config = OidcConfig::new("nicegui-app", issuer, "http://localhost:8010/auth".parse()?)
///     .with_external_issuer(keycloak_session::oauth::realm_issuer("http://localhost:8080", "test-realm")?)
///     .with_client_secret("s3cr3t");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OidcConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: Option<String>,
    pub(crate) internal_issuer: Url,
    pub(crate) external_issuer: Url,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) http_timeout: Duration,
}

impl OidcConfig {
    /// `issuer` is the realm issuer as reachable from this service; the
    /// browser-facing issuer defaults to the same URL.
    #[must_use]
    pub fn new(client_id: impl Into<String>, issuer: Url, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            external_issuer: issuer.clone(),
            internal_issuer: issuer,
            redirect_uri,
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
            http_timeout: Duration::from_secs(10),
        }
    }

    /// Issuer as seen by browsers and external callers.
    #[must_use]
    pub fn with_external_issuer(mut self, issuer: Url) -> Self {
        self.external_issuer = issuer;
        self
    }

    /// Confidential-client secret, sent as `client_secret` on back-channel calls.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Override the scopes (default: `["openid", "profile", "email"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Per-call timeout for every provider request (default 10s).
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn internal_issuer(&self) -> &Url {
        &self.internal_issuer
    }

    #[must_use]
    pub fn external_issuer(&self) -> &Url {
        &self.external_issuer
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Issuer identities in validation order: external, then internal.
    #[must_use]
    pub fn expected_issuers(&self) -> Vec<String> {
        let external = issuer_string(&self.external_issuer);
        let internal = issuer_string(&self.internal_issuer);
        if external == internal {
            vec![external]
        } else {
            vec![external, internal]
        }
    }

    #[must_use]
    pub fn authorization_endpoint(&self) -> Url {
        openid_connect_endpoint(&self.external_issuer, "auth")
    }

    #[must_use]
    pub fn token_endpoint(&self) -> Url {
        openid_connect_endpoint(&self.internal_issuer, "token")
    }

    #[must_use]
    pub fn userinfo_endpoint(&self) -> Url {
        openid_connect_endpoint(&self.internal_issuer, "userinfo")
    }

    #[must_use]
    pub fn revocation_endpoint(&self) -> Url {
        openid_connect_endpoint(&self.internal_issuer, "revoke")
    }
}

/// `{base}/realms/{realm}`
///
/// # Errors
///
/// Returns the parse error if `base` is not an absolute URL.
pub fn realm_issuer(base: &str, realm: &str) -> Result<Url, url::ParseError> {
    format!("{}/realms/{realm}", base.trim_end_matches('/')).parse()
}

fn issuer_string(issuer: &Url) -> String {
    issuer.as_str().trim_end_matches('/').to_owned()
}

fn openid_connect_endpoint(issuer: &Url, name: &str) -> Url {
    let mut url = issuer.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["protocol", "openid-connect", name]);
    }
    url
}

/// Back-channel OIDC client for one Keycloak realm.
pub struct AuthClient {
    config: OidcConfig,
    http: reqwest::Client,
}

/// Authorization URL plus the per-attempt secrets the browser must keep.
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub pkce: PkcePair,
}

/// Token endpoint response.
#[derive(Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Claims returned by the userinfo endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[non_exhaustive]
pub struct UserProfile {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl AuthClient {
    /// Client with a pooled HTTP connection and the configured per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: OidcConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.http_timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Share an existing HTTP client (connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Deterministic authorization-code URL on the browser-facing issuer.
    #[must_use]
    pub fn build_authorization_url(
        &self,
        redirect_uri: &Url,
        scopes: &[String],
        state: &str,
        code_challenge: Option<&str>,
    ) -> Url {
        let mut url = self.config.authorization_endpoint();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("response_type", "code")
                .append_pair("scope", &scopes.join(" "))
                .append_pair("state", state);
            if let Some(challenge) = code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }
        url
    }

    /// Fresh `state` and PKCE pair with the configured redirect URI and scopes.
    #[must_use]
    pub fn authorization_request(&self) -> AuthorizationRequest {
        let state = pkce::generate_state();
        let pkce = PkcePair::generate();
        let url = self.build_authorization_url(
            &self.config.redirect_uri,
            &self.config.scopes,
            &state,
            Some(&pkce.challenge),
        );
        AuthorizationRequest { url, state, pkce }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExchangeFailed`] on network failure, an error
    /// status from the token endpoint, or an unparseable body.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &Url,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet, Error> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .http
            .post(self.config.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::ExchangeFailed(e.to_string()))?;
        let response = ensure_success(response, "token exchange")
            .await
            .map_err(Error::ExchangeFailed)?;
        response
            .json::<TokenSet>()
            .await
            .map_err(|e| Error::ExchangeFailed(format!("malformed token response: {e}")))
    }

    /// Fetch the user's profile with an access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserInfoFailed`] on network failure, an error
    /// status, or an unparseable body.
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<UserProfile, Error> {
        let response = self
            .http
            .get(self.config.userinfo_endpoint())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::UserInfoFailed(e.to_string()))?;
        let response = ensure_success(response, "userinfo request")
            .await
            .map_err(Error::UserInfoFailed)?;
        response
            .json::<UserProfile>()
            .await
            .map_err(|e| Error::UserInfoFailed(format!("malformed userinfo response: {e}")))
    }

    /// Ask the provider to revoke a refresh token (RFC 7009). Single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Revocation`] on network failure or an error status.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), Error> {
        let mut params = vec![
            ("token", refresh_token),
            ("token_type_hint", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(self.config.revocation_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Revocation(e.to_string()))?;
        ensure_success(response, "token revocation")
            .await
            .map(|_| ())
            .map_err(Error::Revocation)
    }
}

/// Returns the response on 2xx, otherwise a message with status and body.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, String> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(format!("{operation} returned HTTP {status}: {body}"))
}
