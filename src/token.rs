use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, decode, decode_header};
use serde_json::Value as JsonValue;

use crate::discovery::ProviderDiscovery;
use crate::error::Error;

/// Algorithms accepted for provider-signed tokens. Symmetric algorithms are
/// never accepted from a JWKS, whatever the token header claims.
const ASYMMETRIC_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Where verification keys come from.
pub enum KeySource {
    /// JWKS advertised by the provider's discovery document.
    Discovered(Arc<ProviderDiscovery>),
    /// A single pinned key, e.g. a realm public key from configuration.
    Static {
        key: DecodingKey,
        algorithms: Vec<Algorithm>,
    },
}

impl KeySource {
    async fn resolve(&self, header: &Header) -> Result<DecodingKey, Error> {
        match self {
            Self::Discovered(discovery) => {
                if !ASYMMETRIC_ALGORITHMS.contains(&header.alg) {
                    return Err(Error::InvalidToken(format!(
                        "algorithm {:?} not accepted",
                        header.alg
                    )));
                }
                discovery.decoding_key(header.kid.as_deref()).await
            }
            Self::Static { key, algorithms } => {
                if !algorithms.contains(&header.alg) {
                    return Err(Error::InvalidToken(format!(
                        "algorithm {:?} not accepted",
                        header.alg
                    )));
                }
                Ok(key.clone())
            }
        }
    }
}

/// Which issuer check a token passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerMatch {
    /// `iss` equalled the expected issuer at `position` in the ordered list.
    Expected { issuer: String, position: usize },
    /// Signature and expiry verified, issuer equality skipped.
    Unchecked,
}

impl IssuerMatch {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Unchecked)
    }
}

/// Decoded, verified claim set of a single bearer token.
///
/// Valid only for the request that produced it; never stored.
#[derive(Debug, Clone)]
pub struct ValidatedIdentity {
    pub subject: Option<String>,
    pub preferred_username: Option<String>,
    pub roles: BTreeSet<String>,
    pub issuer: Option<String>,
    pub issuer_match: IssuerMatch,
    pub claims: JsonValue,
}

impl ValidatedIdentity {
    fn from_claims(claims: JsonValue, issuer_match: IssuerMatch) -> Self {
        let str_claim = |key: &str| claims.get(key).and_then(JsonValue::as_str).map(str::to_owned);
        Self {
            subject: str_claim("sub"),
            preferred_username: str_claim("preferred_username"),
            issuer: str_claim("iss"),
            roles: realm_roles(&claims),
            issuer_match,
            claims,
        }
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Reads `realm_access.roles`; absent or malformed claims yield no roles.
#[must_use]
pub fn realm_roles(claims: &JsonValue) -> BTreeSet<String> {
    claims
        .get("realm_access")
        .and_then(|access| access.get("roles"))
        .and_then(JsonValue::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Counters distinguishing strict, relaxed and rejected validations.
#[derive(Debug, Default)]
pub struct ValidationStats {
    strict: AtomicU64,
    relaxed: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationCounts {
    pub strict: u64,
    pub relaxed: u64,
    pub rejected: u64,
}

impl ValidationStats {
    #[must_use]
    pub fn snapshot(&self) -> ValidationCounts {
        ValidationCounts {
            strict: self.strict.load(Ordering::Relaxed),
            relaxed: self.relaxed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Bearer-token validator with ordered issuer fallback.
///
/// Keycloak stamps `iss` with the hostname the *caller* used, so a token
/// obtained through the external URL carries a different issuer than the
/// one this service sees on the internal network. Validation therefore
/// tries each expected issuer in order and, as a last resort, accepts any
/// issuer while still verifying signature and expiry. That last tier is a
/// degraded-trust mode: it is logged at `warn` and counted separately.
pub struct TokenValidator {
    keys: KeySource,
    issuers: Vec<String>,
    audience: Option<String>,
    leeway_secs: u64,
    stats: ValidationStats,
}

impl TokenValidator {
    /// Validator for the given key source and default ordered issuer list.
    #[must_use]
    pub fn new(keys: KeySource, issuers: Vec<String>) -> Self {
        Self {
            keys,
            issuers,
            audience: None,
            leeway_secs: 60,
            stats: ValidationStats::default(),
        }
    }

    /// Require `aud` to contain this value (not checked by default).
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Clock skew tolerated on `exp`/`nbf` (default 60s).
    #[must_use]
    pub fn with_leeway_secs(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// The default expected issuers, in attempt order.
    #[must_use]
    pub fn issuers(&self) -> &[String] {
        &self.issuers
    }

    #[must_use]
    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    /// Validate against the configured issuers (external first, then internal).
    ///
    /// # Errors
    ///
    /// See [`validate_with_issuers`](Self::validate_with_issuers).
    pub async fn validate(&self, token: &str) -> Result<ValidatedIdentity, Error> {
        self.validate_with_issuers(token, &self.issuers).await
    }

    /// Validate `token`, trying each of `expected_issuers` in order, then
    /// with issuer checking disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] carrying the last decode error when
    /// every attempt fails, or [`Error::Discovery`] when signing keys cannot
    /// be fetched.
    pub async fn validate_with_issuers(
        &self,
        token: &str,
        expected_issuers: &[String],
    ) -> Result<ValidatedIdentity, Error> {
        let header = decode_header(token).map_err(|e| self.reject(e.to_string()))?;
        let key = match self.keys.resolve(&header).await {
            Ok(key) => key,
            Err(Error::InvalidToken(reason)) => return Err(self.reject(reason)),
            Err(other) => return Err(other),
        };

        for (position, issuer) in expected_issuers.iter().enumerate() {
            let mut validation = self.base_validation(header.alg);
            validation.set_issuer(&[issuer]);
            match decode::<JsonValue>(token, &key, &validation) {
                Ok(data) => {
                    self.stats.strict.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(issuer = %issuer, position, "Token accepted with pinned issuer");
                    let issuer_match = IssuerMatch::Expected {
                        issuer: issuer.clone(),
                        position,
                    };
                    return Ok(ValidatedIdentity::from_claims(data.claims, issuer_match));
                }
                Err(e) => {
                    tracing::debug!(issuer = %issuer, error = %e, "Issuer attempt failed");
                }
            }
        }

        let validation = self.base_validation(header.alg);
        match decode::<JsonValue>(token, &key, &validation) {
            Ok(data) => {
                self.stats.relaxed.fetch_add(1, Ordering::Relaxed);
                let identity = ValidatedIdentity::from_claims(data.claims, IssuerMatch::Unchecked);
                tracing::warn!(
                    token_issuer = identity.issuer.as_deref().unwrap_or("<none>"),
                    expected = ?expected_issuers,
                    "Token accepted WITHOUT issuer verification (degraded trust)"
                );
                Ok(identity)
            }
            Err(e) => Err(self.reject(e.to_string())),
        }
    }

    fn base_validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway_secs;
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        validation
    }

    fn reject(&self, reason: String) -> Error {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::info!(reason = %reason, "Token rejected");
        Error::InvalidToken(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, encode};
    use serde_json::json;

    const SECRET: &[u8] = b"unit-test-shared-secret-unit-test-shared-secret";
    const EXTERNAL: &str = "http://localhost:8080/realms/test-realm";
    const INTERNAL: &str = "http://keycloak:8080/realms/test-realm";

    fn validator() -> TokenValidator {
        TokenValidator::new(
            KeySource::Static {
                key: DecodingKey::from_secret(SECRET),
                algorithms: vec![Algorithm::HS256],
            },
            vec![EXTERNAL.to_string(), INTERNAL.to_string()],
        )
    }

    fn sign(claims: &JsonValue, secret: &[u8]) -> String {
        encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn claims(iss: &str, roles: &[&str]) -> JsonValue {
        let exp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 300;
        json!({
            "iss": iss,
            "sub": "f3b5c0de",
            "exp": exp,
            "preferred_username": "testuser",
            "realm_access": { "roles": roles },
        })
    }

    #[tokio::test]
    async fn external_issuer_matches_first() {
        let v = validator();
        let token = sign(&claims(EXTERNAL, &["role1"]), SECRET);

        let identity = v.validate(&token).await.unwrap();
        assert_eq!(
            identity.issuer_match,
            IssuerMatch::Expected { issuer: EXTERNAL.into(), position: 0 }
        );
        assert_eq!(identity.preferred_username.as_deref(), Some("testuser"));
        assert_eq!(identity.roles, BTreeSet::from(["role1".to_string()]));
    }

    #[tokio::test]
    async fn internal_issuer_matches_second() {
        let v = validator();
        let token = sign(&claims(INTERNAL, &["role1", "role2"]), SECRET);

        let identity = v.validate(&token).await.unwrap();
        assert_eq!(
            identity.issuer_match,
            IssuerMatch::Expected { issuer: INTERNAL.into(), position: 1 }
        );
        assert!(identity.has_role("role2"));
        assert_eq!(v.stats().snapshot().strict, 1);
    }

    #[tokio::test]
    async fn foreign_issuer_falls_back_to_unchecked() {
        let v = validator();
        let token = sign(&claims("http://elsewhere/realms/x", &["role2"]), SECRET);

        let identity = v.validate(&token).await.unwrap();
        assert!(identity.issuer_match.is_degraded());
        assert_eq!(identity.issuer.as_deref(), Some("http://elsewhere/realms/x"));
        assert_eq!(
            v.stats().snapshot(),
            ValidationCounts { strict: 0, relaxed: 1, rejected: 0 }
        );
    }

    #[tokio::test]
    async fn bad_signature_fails_every_tier() {
        let v = validator();
        let token = sign(&claims(EXTERNAL, &["role2"]), b"some-other-secret-entirely-some-other");

        let err = v.validate(&token).await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken(ref m) if m.contains("InvalidSignature")));
        assert_eq!(v.stats().snapshot().rejected, 1);
        assert_eq!(v.stats().snapshot().relaxed, 0);
    }

    #[tokio::test]
    async fn expired_token_is_rejected_even_without_issuer_check() {
        let v = validator().with_leeway_secs(0);
        let mut expired = claims("http://elsewhere", &["role2"]);
        expired["exp"] = json!(1_000_000_000u64);

        let err = v.validate(&sign(&expired, SECRET)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken(ref m) if m.contains("ExpiredSignature")));
    }

    #[tokio::test]
    async fn malformed_token_is_invalid() {
        let err = validator().validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)));
    }

    #[tokio::test]
    async fn disallowed_algorithm_is_rejected() {
        let token = encode(
            &jsonwebtoken::Header::new(Algorithm::HS512),
            &claims(EXTERNAL, &[]),
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        let err = validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken(ref m) if m.contains("not accepted")));
    }

    #[tokio::test]
    async fn explicit_issuer_list_overrides_default() {
        let v = validator();
        let token = sign(&claims("http://other/realms/r", &[]), SECRET);

        let identity = v
            .validate_with_issuers(&token, &["http://other/realms/r".to_string()])
            .await
            .unwrap();
        assert!(!identity.issuer_match.is_degraded());
    }

    #[test]
    fn realm_roles_tolerates_missing_claims() {
        assert!(realm_roles(&json!({})).is_empty());
        assert!(realm_roles(&json!({"realm_access": {}})).is_empty());
        assert!(realm_roles(&json!({"realm_access": {"roles": "role1"}})).is_empty());
        assert_eq!(
            realm_roles(&json!({"realm_access": {"roles": ["a", 7, "b"]}})),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
    }
}
