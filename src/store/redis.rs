use std::future::Future;
use std::time::Duration;

use fred::prelude::*;

use super::{SessionStore, StoreConfig, StoreError};
use crate::error::Error;
use crate::session::Session;
use crate::types::SessionId;

/// Redis-backed session store shared by every application instance.
///
/// Each session is one JSON value under `{prefix}:{id}` with a TTL equal to
/// the inactivity window. Reads refresh the TTL; an expired key reads as
/// anonymous.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: Client,
    prefix: String,
    inactivity: Duration,
    command_timeout: Duration,
}

fn from_redis_error(err: fred::error::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[allow(clippy::cast_possible_wrap)]
const fn seconds_to_i64(seconds: u64) -> i64 {
    seconds as i64
}

impl RedisSessionStore {
    /// Connect and wait for the first successful handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a malformed URL, or [`Error::Store`] if
    /// the server cannot be reached within the command timeout.
    pub async fn connect(url: &str, config: &StoreConfig) -> Result<Self, Error> {
        let redis_config =
            Config::from_url(url).map_err(|e| Error::Config(format!("REDIS_URL: {e}")))?;
        let client = Client::new(
            redis_config,
            None,
            None,
            Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
        );

        let store = Self {
            client,
            prefix: config.key_prefix.clone(),
            inactivity: config.inactivity,
            command_timeout: config.command_timeout,
        };
        store
            .bounded(async { store.client.init().await.map(|_| ()) })
            .await?;
        Ok(store)
    }

    fn key(&self, id: &SessionId) -> String {
        format_key(&self.prefix, id)
    }

    fn ttl_secs(&self) -> i64 {
        seconds_to_i64(self.inactivity.as_secs().max(1))
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, fred::error::Error>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.command_timeout, op).await {
            Ok(result) => result.map_err(from_redis_error),
            Err(_) => Err(StoreError::Timeout(self.command_timeout)),
        }
    }
}

fn format_key(prefix: &str, id: &SessionId) -> String {
    if prefix.is_empty() {
        id.to_string()
    } else {
        format!("{prefix}:{id}")
    }
}

impl SessionStore for RedisSessionStore {
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        let key = self.key(id);
        let value: Option<String> = self.bounded(self.client.get(&key)).await?;
        let Some(value) = value else {
            return Ok(Session::Anonymous);
        };
        let _: bool = self
            .bounded(self.client.expire(&key, self.ttl_secs(), None))
            .await?;
        Ok(serde_json::from_str(&value)?)
    }

    async fn put(&self, id: &SessionId, session: Session) -> Result<(), StoreError> {
        let key = self.key(id);
        let serialized = serde_json::to_string(&session)?;
        self.bounded(self.client.set::<(), _, _>(
            &key,
            serialized,
            Some(Expiration::EX(self.ttl_secs())),
            None,
            false,
        ))
        .await
    }

    async fn clear(&self, id: &SessionId) -> Result<(), StoreError> {
        let key = self.key(id);
        self.bounded(self.client.del::<(), _>(&key)).await
    }
}
