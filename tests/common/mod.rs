//! Mock Keycloak realm and app wiring shared by the end-to-end tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use keycloak_session::middleware::{AuthConfig, AuthState, CookieKey, router};
use keycloak_session::store::MemorySessionStore;
use keycloak_session::{OidcConfig, oauth::realm_issuer};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REALM: &str = "test-realm";
pub const EXTERNAL_BASE: &str = "http://localhost:8080";
pub const KID: &str = "sig-1";

const PROVIDER_KEY: &[u8] = include_bytes!("../fixtures/provider_rsa.pem");
const ROGUE_KEY: &[u8] = include_bytes!("../fixtures/rogue_rsa.pem");
const PROVIDER_MODULUS: &str = include_str!("../fixtures/provider_rsa.n");

pub struct Realm {
    pub server: MockServer,
}

impl Realm {
    /// Realm serving discovery and JWKS.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = format!("{}/realms/{REALM}", server.uri());
        Mock::given(method("GET"))
            .and(path(format!("/realms/{REALM}/.well-known/openid-configuration")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/protocol/openid-connect/auth"),
                "token_endpoint": format!("{issuer}/protocol/openid-connect/token"),
                "userinfo_endpoint": format!("{issuer}/protocol/openid-connect/userinfo"),
                "jwks_uri": format!("{issuer}/protocol/openid-connect/certs"),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/realms/{REALM}/protocol/openid-connect/certs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{
                    "kid": KID,
                    "kty": "RSA",
                    "use": "sig",
                    "alg": "RS256",
                    "n": PROVIDER_MODULUS.trim(),
                    "e": "AQAB",
                }]
            })))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Issuer as seen from inside the deployment (the mock server).
    pub fn internal_issuer(&self) -> String {
        format!("{}/realms/{REALM}", self.server.uri())
    }

    /// Issuer as seen by browsers.
    pub fn external_issuer(&self) -> String {
        format!("{EXTERNAL_BASE}/realms/{REALM}")
    }

    /// Token endpoint answers `code` with a token for `username`.
    pub async fn expect_login(&self, code: &str, username: &str, roles: &[&str]) -> String {
        let access_token = sign(&claims(&self.external_issuer(), username, roles));
        self.answer_code(code, &access_token, username).await;
        self.answer_userinfo(&access_token, 200, profile(username)).await;
        access_token
    }

    /// Token endpoint answers `code` with `access_token`.
    pub async fn answer_code(&self, code: &str, access_token: &str, username: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/realms/{REALM}/protocol/openid-connect/token")))
            .and(body_string_contains(format!("code={code}&")))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "refresh_token": format!("rt-{username}"),
                "token_type": "Bearer",
                "expires_in": 300,
            })))
            .mount(&self.server)
            .await;
    }

    /// Userinfo endpoint answers requests bearing `access_token`.
    pub async fn answer_userinfo(&self, access_token: &str, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/realms/{REALM}/protocol/openid-connect/userinfo")))
            .and(header("authorization", format!("Bearer {access_token}").as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Number of JWKS downloads served so far.
    pub async fn jwks_fetches(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path().ends_with("/protocol/openid-connect/certs"))
            .count()
    }

    pub async fn revocation_returns(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(format!("/realms/{REALM}/protocol/openid-connect/revoke")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }
}

pub fn profile(username: &str) -> Value {
    json!({
        "sub": format!("sub-{username}"),
        "preferred_username": username,
        "email": format!("{username}@example.com"),
        "given_name": "Test",
        "family_name": username,
        "phone_number": "918273645098",
    })
}

pub fn claims(issuer: &str, username: &str, roles: &[&str]) -> Value {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    json!({
        "iss": issuer,
        "sub": format!("sub-{username}"),
        "iat": now,
        "exp": now + 300,
        "azp": "nicegui-app",
        "preferred_username": username,
        "realm_access": { "roles": roles },
    })
}

fn sign_with(claims: &Value, pem: &[u8], kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.into());
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

/// Token signed by the realm key.
pub fn sign(claims: &Value) -> String {
    sign_with(claims, PROVIDER_KEY, KID)
}

/// Token with the realm's `kid` but signed by an unrelated key.
pub fn sign_rogue(claims: &Value) -> String {
    sign_with(claims, ROGUE_KEY, KID)
}

/// Token naming a `kid` the realm never published.
pub fn sign_with_unknown_kid(claims: &Value, kid: &str) -> String {
    sign_with(claims, ROGUE_KEY, kid)
}

pub struct App {
    pub router: Router,
    pub state: AuthState<MemorySessionStore>,
    pub store: Arc<MemorySessionStore>,
}

impl App {
    pub fn new(realm: &Realm) -> Self {
        let oidc = OidcConfig::new(
            "nicegui-app",
            realm.internal_issuer().parse().unwrap(),
            "http://localhost:8010/auth".parse().unwrap(),
        )
        .with_external_issuer(realm_issuer(EXTERNAL_BASE, REALM).unwrap());
        let config = AuthConfig::new(oidc, CookieKey::generate()).with_secure_cookies(false);
        let state = AuthState::new(config, MemorySessionStore::new(std::time::Duration::from_secs(3600)))
            .unwrap();
        let store = Arc::clone(state.store());
        Self {
            router: router(state.clone()),
            state,
            store,
        }
    }

    /// A browser: its own cookie jar against the shared app.
    pub fn browser(&self) -> TestServer {
        TestServer::builder()
            .save_cookies()
            .build(self.router.clone())
            .unwrap()
    }

    /// A non-browser API client.
    pub fn client(&self) -> TestServer {
        TestServer::new(self.router.clone()).unwrap()
    }

    /// A browser against the app plus `extra` routes sharing its state.
    pub fn browser_with(&self, extra: Router<AuthState<MemorySessionStore>>) -> TestServer {
        let router = self.router.clone().merge(extra.with_state(self.state.clone()));
        TestServer::builder().save_cookies().build(router).unwrap()
    }
}

/// `state` query parameter of a login redirect.
pub fn state_param(location: &str) -> String {
    url::Url::parse(location)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}
