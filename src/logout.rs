use std::sync::Arc;

use crate::error::Error;
use crate::oauth::AuthClient;
use crate::store::SessionStore;
use crate::types::SessionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revocation {
    Revoked,
    /// No refresh token was held for the session.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub revocation: Revocation,
}

/// Ends a session: revokes the refresh token at the provider, then clears
/// the stored session.
///
/// Revocation is best-effort and never blocks the local logout. Only a
/// store failure is reported as an error.
pub struct LogoutCoordinator<S> {
    client: Arc<AuthClient>,
    store: Arc<S>,
}

impl<S> Clone for LogoutCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SessionStore> LogoutCoordinator<S> {
    #[must_use]
    pub fn new(client: Arc<AuthClient>, store: Arc<S>) -> Self {
        Self { client, store }
    }

    /// # Errors
    ///
    /// Returns [`Error::Store`] if the session could not be read or cleared.
    /// Provider failures are reported in [`LogoutOutcome::revocation`].
    pub async fn logout(&self, id: &SessionId) -> Result<LogoutOutcome, Error> {
        let session = match self.store.get(id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Could not read session before logout");
                self.store.clear(id).await?;
                return Err(e.into());
            }
        };

        let revocation = match session.refresh_token() {
            None => Revocation::Skipped,
            Some(refresh_token) => match self.client.revoke_refresh_token(refresh_token).await {
                Ok(()) => Revocation::Revoked,
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "Refresh token revocation failed");
                    Revocation::Failed(e.to_string())
                }
            },
        };

        self.store.clear(id).await?;
        tracing::info!(session_id = %id, revocation = ?revocation, "Logged out");
        Ok(LogoutOutcome { revocation })
    }
}
