use axum::Json;
use axum::http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::Error;

/// Authentication errors for the HTTP layer. Rendered as `{"detail": ...}`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No credentials were presented.
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Invalid authentication credentials: {0}")]
    InvalidCredentials(String),

    /// The session cookie names a session that is no longer authenticated.
    #[error("Session expired")]
    SessionExpired,

    #[error("User does not have required role: {0}")]
    Forbidden(String),

    /// Provider metadata or signing keys could not be fetched.
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::InvalidCredentials(_) | Self::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Unauthenticated | Self::InvalidCredentials(_) | Self::SessionExpired => {
                let body = Json(json!({ "detail": self.to_string() }));
                (
                    status,
                    [(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
                    body,
                )
                    .into_response()
            }
            Self::Forbidden(_) => (status, Json(json!({ "detail": self.to_string() }))).into_response(),
            Self::ProviderUnavailable(_) => {
                tracing::warn!(error = %self, "Identity provider unavailable");
                (status, Json(json!({ "detail": "Identity provider unavailable" }))).into_response()
            }
            Self::Store(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (status, Json(json!({ "detail": "Internal error" }))).into_response()
            }
        }
    }
}

impl From<Error> for AuthError {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidToken(reason) => Self::InvalidCredentials(reason),
            Error::Forbidden { role } => Self::Forbidden(role),
            Error::SessionExpired => Self::SessionExpired,
            Error::Discovery(reason)
            | Error::ExchangeFailed(reason)
            | Error::UserInfoFailed(reason)
            | Error::Revocation(reason) => Self::ProviderUnavailable(reason),
            Error::Store(e) => Self::Store(e.to_string()),
            Error::Config(reason) => Self::Config(reason),
        }
    }
}
