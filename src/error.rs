use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Signature, expiry or issuer check failed on every attempted issuer.
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Code exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("User info request failed: {0}")]
    UserInfoFailed(String),
    #[error("User does not have required role: {role}")]
    Forbidden { role: String },
    #[error("Session expired")]
    SessionExpired,
    #[error("Provider discovery failed: {0}")]
    Discovery(String),
    #[error("Token revocation failed: {0}")]
    Revocation(String),
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Config(String),
}
