use std::sync::Arc;

use crate::error::Error;
use crate::oauth::AuthClient;
use crate::session::AuthenticatedSession;
use crate::token::TokenValidator;

/// Completes an authorization-code login.
///
/// The three provider steps run strictly in order and the result is
/// all-or-nothing: any failure returns an error and nothing is written.
#[derive(Clone)]
pub struct LoginFlow {
    client: Arc<AuthClient>,
    validator: Arc<TokenValidator>,
}

impl LoginFlow {
    #[must_use]
    pub fn new(client: Arc<AuthClient>, validator: Arc<TokenValidator>) -> Self {
        Self { client, validator }
    }

    #[must_use]
    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Exchange `code`, fetch the profile and verify the access token.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error: [`Error::ExchangeFailed`],
    /// [`Error::UserInfoFailed`], [`Error::InvalidToken`] or
    /// [`Error::Discovery`].
    pub async fn complete(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthenticatedSession, Error> {
        let redirect_uri = self.client.config().redirect_uri();

        let tokens = self
            .client
            .exchange_code(code, redirect_uri, code_verifier)
            .await
            .inspect_err(|e| tracing::warn!(stage = "exchange", error = %e, "Login failed"))?;

        let profile = self
            .client
            .fetch_user_info(&tokens.access_token)
            .await
            .inspect_err(|e| tracing::warn!(stage = "userinfo", error = %e, "Login failed"))?;

        let identity = self
            .validator
            .validate(&tokens.access_token)
            .await
            .inspect_err(|e| tracing::warn!(stage = "validate", error = %e, "Login failed"))?;

        let session = AuthenticatedSession::compose(tokens, profile, &identity)
            .inspect_err(|e| tracing::warn!(stage = "compose", error = %e, "Login failed"))?;
        tracing::info!(
            username = %session.username,
            roles = ?session.roles,
            degraded_issuer = identity.issuer_match.is_degraded(),
            "Login completed"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::OidcConfig;
    use crate::token::KeySource;
    use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &[u8] = b"flow-test-shared-secret-flow-test-shared-secret";

    fn access_token_claims(issuer: &str, roles: &[&str]) -> serde_json::Value {
        let exp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 300;
        json!({
            "iss": issuer,
            "sub": "abc",
            "exp": exp,
            "preferred_username": "testuser",
            "realm_access": { "roles": roles },
        })
    }

    fn sign(claims: &serde_json::Value) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn access_token(issuer: &str, roles: &[&str]) -> String {
        sign(&access_token_claims(issuer, roles))
    }

    /// Log output captured from a scoped `fmt` subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn flow(server: &MockServer) -> (LoginFlow, String) {
        let issuer = format!("{}/realms/test-realm", server.uri());
        let config = OidcConfig::new(
            "nicegui-app",
            issuer.parse().unwrap(),
            "http://localhost:8010/auth".parse().unwrap(),
        );
        let validator = TokenValidator::new(
            KeySource::Static {
                key: DecodingKey::from_secret(SECRET),
                algorithms: vec![Algorithm::HS256],
            },
            config.expected_issuers(),
        );
        let client = AuthClient::new(config).unwrap();
        (LoginFlow::new(Arc::new(client), Arc::new(validator)), issuer)
    }

    async fn mount_token(server: &MockServer, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/realms/test-realm/protocol/openid-connect/token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_userinfo(server: &MockServer, status: u16, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/realms/test-realm/protocol/openid-connect/userinfo"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn successful_login_builds_full_session() {
        let server = MockServer::start().await;
        let (flow, issuer) = flow(&server);
        Mock::given(method("POST"))
            .and(body_string_contains("code=abc123"))
            .and(body_string_contains("code_verifier=v3rifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token(&issuer, &["role1", "role2"]),
                "refresh_token": "rt-1",
                "token_type": "Bearer",
            })))
            .mount(&server)
            .await;
        mount_userinfo(
            &server,
            200,
            json!({
                "sub": "abc",
                "preferred_username": "testuser",
                "email": "testuser@example.com",
                "given_name": "Test",
                "family_name": "User",
            }),
        )
        .await;

        let session = flow.complete("abc123", Some("v3rifier")).await.unwrap();
        assert_eq!(session.username, "testuser");
        assert_eq!(session.email.as_deref(), Some("testuser@example.com"));
        assert!(session.roles.contains("role2"));
        assert_eq!(session.tokens.refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn exchange_failure_stops_before_userinfo() {
        let server = MockServer::start().await;
        let (flow, _) = flow(&server);
        mount_token(&server, 400, json!({"error": "invalid_grant"})).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = flow.complete("stale", None).await.unwrap_err();
        assert!(matches!(err, Error::ExchangeFailed(_)));
    }

    #[tokio::test]
    async fn userinfo_failure_is_reported() {
        let server = MockServer::start().await;
        let (flow, issuer) = flow(&server);
        mount_token(
            &server,
            200,
            json!({"access_token": access_token(&issuer, &["role1"])}),
        )
        .await;
        mount_userinfo(&server, 500, json!({})).await;

        let err = flow.complete("abc", None).await.unwrap_err();
        assert!(matches!(err, Error::UserInfoFailed(_)));
    }

    #[tokio::test]
    async fn unverifiable_access_token_fails_login() {
        let server = MockServer::start().await;
        let (flow, _) = flow(&server);
        mount_token(&server, 200, json!({"access_token": "garbage"})).await;
        mount_userinfo(&server, 200, json!({"preferred_username": "testuser"})).await;

        let err = flow.complete("abc", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)));
    }

    #[tokio::test]
    async fn nameless_identity_is_logged_as_compose_failure() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let server = MockServer::start().await;
        let (flow, issuer) = flow(&server);
        let mut claims = access_token_claims(&issuer, &["role2"]);
        claims.as_object_mut().unwrap().remove("preferred_username");
        mount_token(&server, 200, json!({"access_token": sign(&claims)})).await;
        mount_userinfo(&server, 200, json!({"sub": "abc"})).await;

        let err = flow.complete("abc", None).await.unwrap_err();
        assert!(matches!(err, Error::UserInfoFailed(_)));

        let text = logs.text();
        assert!(text.contains("Login failed"), "{text}");
        assert!(text.contains("compose"), "{text}");
    }
}
