//! Session persistence.
//!
//! A [`SessionStore`] maps an opaque [`SessionId`] to a [`Session`]. Reads
//! of unknown or idle-expired ids yield [`Session::Anonymous`] rather than
//! an error, so repeated reads stay well-defined.

use std::future::Future;
use std::time::Duration;

use crate::error::Error;
use crate::session::Session;
use crate::types::SessionId;

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemorySessionStore;
#[cfg(feature = "redis")]
pub use redis::RedisSessionStore;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Pluggable session persistence.
///
/// Writes for one id are last-writer-wins; they only happen on login and
/// logout, which a single user performs serially.
pub trait SessionStore: Send + Sync + 'static {
    /// Current session for `id`, refreshing its inactivity window.
    fn get(&self, id: &SessionId) -> impl Future<Output = Result<Session, StoreError>> + Send;

    /// Replace the session for `id` in a single write.
    fn put(
        &self,
        id: &SessionId,
        session: Session,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove everything stored for `id`.
    fn clear(&self, id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Store settings.
///
/// # Env vars
/// - `REDIS_URL`: use Redis when set, otherwise an in-process map
/// - `SESSION_INACTIVITY_SECS`: inactivity timeout (default 3600)
/// - `SESSION_KEY_PREFIX`: Redis key prefix (default `session`)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub redis_url: Option<String>,
    pub inactivity: Duration,
    pub key_prefix: String,
    pub command_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            inactivity: Duration::from_secs(3600),
            key_prefix: "session".into(),
            command_timeout: Duration::from_secs(2),
        }
    }
}

impl StoreConfig {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `SESSION_INACTIVITY_SECS` is not a positive integer.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self {
            redis_url: lookup("REDIS_URL").filter(|u| !u.trim().is_empty()),
            ..Self::default()
        };
        if let Some(secs) = lookup("SESSION_INACTIVITY_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| {
                    Error::Config(format!("SESSION_INACTIVITY_SECS: expected positive integer, got '{secs}'"))
                })?;
            config.inactivity = Duration::from_secs(secs);
        }
        if let Some(prefix) = lookup("SESSION_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        Ok(config)
    }
}

/// Store selected at startup from [`StoreConfig`].
pub enum SessionBackend {
    Memory(MemorySessionStore),
    #[cfg(feature = "redis")]
    Redis(RedisSessionStore),
}

impl SessionBackend {
    /// Connect the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if Redis is configured but unreachable, or
    /// [`Error::Config`] if `REDIS_URL` is set without the `redis` feature.
    pub async fn connect(config: &StoreConfig) -> Result<Self, Error> {
        match &config.redis_url {
            None => {
                tracing::info!(inactivity_secs = config.inactivity.as_secs(), "Using in-process session store");
                Ok(Self::Memory(MemorySessionStore::new(config.inactivity)))
            }
            #[cfg(feature = "redis")]
            Some(url) => {
                let store = RedisSessionStore::connect(url, config).await?;
                tracing::info!(inactivity_secs = config.inactivity.as_secs(), "Using Redis session store");
                Ok(Self::Redis(store))
            }
            #[cfg(not(feature = "redis"))]
            Some(_) => Err(Error::Config(
                "REDIS_URL is set but the `redis` feature is disabled".into(),
            )),
        }
    }

    /// Drop idle entries (in-process backend only; Redis expires keys itself).
    pub fn purge_expired(&self) -> usize {
        match self {
            Self::Memory(store) => store.purge_expired(),
            #[cfg(feature = "redis")]
            Self::Redis(_) => 0,
        }
    }
}

impl SessionStore for SessionBackend {
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        match self {
            Self::Memory(store) => store.get(id).await,
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.get(id).await,
        }
    }

    async fn put(&self, id: &SessionId, session: Session) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.put(id, session).await,
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.put(id, session).await,
        }
    }

    async fn clear(&self, id: &SessionId) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.clear(id).await,
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.clear(id).await,
        }
    }
}
