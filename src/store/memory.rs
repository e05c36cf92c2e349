use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::{SessionStore, StoreError};
use crate::session::Session;
use crate::types::SessionId;

struct Entry {
    session: Session,
    last_seen: Instant,
}

/// In-process session store for single-instance deployments.
///
/// Entries live in a sharded map, so operations on one id only lock that
/// id's shard. An entry idle for longer than the inactivity window reverts
/// to [`Session::Anonymous`] on its next read; the key itself stays.
#[derive(Clone)]
pub struct MemorySessionStore {
    entries: Arc<DashMap<SessionId, Entry>>,
    inactivity: Duration,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(inactivity: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            inactivity,
        }
    }

    /// Number of stored ids, including ones reverted to anonymous.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove entries idle past the window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_seen) <= self.inactivity);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged idle sessions");
        }
        removed
    }
}

impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        let Some(mut entry) = self.entries.get_mut(id) else {
            return Ok(Session::Anonymous);
        };
        let now = Instant::now();
        if now.duration_since(entry.last_seen) > self.inactivity && entry.session.is_authenticated() {
            tracing::info!(session_id = %id, "Session idle past inactivity window, reverting to anonymous");
            entry.session = Session::Anonymous;
        }
        entry.last_seen = now;
        Ok(entry.session.clone())
    }

    async fn put(&self, id: &SessionId, session: Session) -> Result<(), StoreError> {
        self.entries.insert(
            id.clone(),
            Entry {
                session,
                last_seen: Instant::now(),
            },
        );
        Ok(())
    }

    async fn clear(&self, id: &SessionId) -> Result<(), StoreError> {
        self.entries.remove(id);
        Ok(())
    }
}
