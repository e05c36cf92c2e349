//! Provider metadata and signing-key cache.
//!
//! The `.well-known/openid-configuration` document and the JWKS it points
//! to are fetched once per process and shared by every request. The key set
//! is refreshed when a token names a `kid` the cached set does not contain
//! (key rotation). Refreshes are serialized and rate limited, so a flood of
//! tokens with made-up `kid`s costs the provider at most one fetch per
//! [`MIN_REFRESH_INTERVAL`].

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use url::Url;

use crate::error::Error;

/// Subset of `OpenID` Provider Metadata used by this crate.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

/// Minimum time between two JWKS refreshes triggered by unknown `kid`s.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Process-wide cache of provider metadata and signing keys.
pub struct ProviderDiscovery {
    http: reqwest::Client,
    discovery_url: Url,
    metadata: RwLock<Option<Arc<ProviderMetadata>>>,
    keys: RwLock<Option<Arc<JwkSet>>>,
    /// Held for the duration of a key fetch; records the last miss-driven refresh.
    last_refresh: Mutex<Option<Instant>>,
    min_refresh_interval: Duration,
}

impl ProviderDiscovery {
    /// Discovery rooted at `{issuer}/.well-known/openid-configuration`.
    #[must_use]
    pub fn new(http: reqwest::Client, issuer: &Url) -> Self {
        Self {
            http,
            discovery_url: well_known_url(issuer),
            metadata: RwLock::new(None),
            keys: RwLock::new(None),
            last_refresh: Mutex::new(None),
            min_refresh_interval: MIN_REFRESH_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn discovery_url(&self) -> &Url {
        &self.discovery_url
    }

    /// Provider metadata, fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the document cannot be fetched or parsed.
    pub async fn metadata(&self) -> Result<Arc<ProviderMetadata>, Error> {
        if let Some(cached) = self.metadata.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let mut slot = self.metadata.write().await;
        // another task may have filled it while we waited for the lock
        if let Some(cached) = slot.as_ref() {
            return Ok(cached.clone());
        }

        let fetched: ProviderMetadata = self.get_json(self.discovery_url.as_str()).await?;
        tracing::debug!(issuer = %fetched.issuer, jwks_uri = %fetched.jwks_uri, "Provider metadata loaded");
        let fetched = Arc::new(fetched);
        *slot = Some(fetched.clone());
        Ok(fetched)
    }

    /// Resolve the decoding key for a token header's `kid`.
    ///
    /// An unknown `kid` triggers one JWKS refresh before giving up, unless a
    /// refresh already happened within the minimum refresh interval.
    /// Concurrent misses share a single fetch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if metadata or keys cannot be fetched, or
    /// [`Error::InvalidToken`] if no usable signing key matches.
    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, Error> {
        let keys = self.cached_keys().await?;
        if let Some(jwk) = select_key(&keys, kid) {
            return to_decoding_key(jwk);
        }

        let keys = self.refresh_on_miss(&keys, kid).await?;
        match select_key(&keys, kid) {
            Some(jwk) => to_decoding_key(jwk),
            None => Err(Error::InvalidToken(format!(
                "no signing key for kid '{}'",
                kid.unwrap_or("<none>")
            ))),
        }
    }

    /// Re-fetch the JWKS unconditionally and replace the cached set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] on fetch or parse failure; the previous
    /// set stays cached in that case.
    pub async fn refresh_keys(&self) -> Result<Arc<JwkSet>, Error> {
        let metadata = self.metadata().await?;
        let fetched: JwkSet = self.get_json(&metadata.jwks_uri).await?;
        let fetched = Arc::new(fetched);
        *self.keys.write().await = Some(fetched.clone());
        Ok(fetched)
    }

    async fn cached_keys(&self) -> Result<Arc<JwkSet>, Error> {
        if let Some(cached) = self.current_keys().await {
            return Ok(cached);
        }

        let _fetching = self.last_refresh.lock().await;
        if let Some(cached) = self.current_keys().await {
            return Ok(cached);
        }
        self.refresh_keys().await
    }

    async fn refresh_on_miss(
        &self,
        seen: &Arc<JwkSet>,
        kid: Option<&str>,
    ) -> Result<Arc<JwkSet>, Error> {
        let mut last_refresh = self.last_refresh.lock().await;

        // another caller refreshed while we waited for the lock
        if let Some(current) = self.current_keys().await
            && !Arc::ptr_eq(&current, seen)
        {
            return Ok(current);
        }

        if last_refresh.is_some_and(|at| at.elapsed() < self.min_refresh_interval) {
            tracing::debug!(kid = kid.unwrap_or("<none>"), "JWKS refreshed recently, not refetching");
            return Ok(seen.clone());
        }

        tracing::info!(kid = kid.unwrap_or("<none>"), "Signing key not cached, refreshing JWKS");
        *last_refresh = Some(Instant::now());
        self.refresh_keys().await
    }

    async fn current_keys(&self) -> Option<Arc<JwkSet>> {
        self.keys.read().await.clone()
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Discovery(format!(
                "{url}: HTTP {}",
                response.status().as_u16()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Discovery(format!("{url}: {e}")))
    }
}

fn well_known_url(issuer: &Url) -> Url {
    let mut url = issuer.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend([".well-known", "openid-configuration"]);
    }
    url
}

/// Keycloak publishes an encryption key alongside the signing keys, so a
/// header without `kid` falls back to the first key not marked `enc`.
fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None => keys
            .keys
            .iter()
            .find(|k| !matches!(k.common.public_key_use, Some(PublicKeyUse::Encryption))),
    }
}

fn to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, Error> {
    DecodingKey::from_jwk(jwk).map_err(|e| Error::InvalidToken(format!("unusable JWK: {e}")))
}
