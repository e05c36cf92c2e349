//! Keycloak login and bearer-token middleware for Axum.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use keycloak_session::middleware::{AuthConfig, AuthState, router};
//! use keycloak_session::store::SessionBackend;
//!
//! // 1. Configure from environment
//! let config = AuthConfig::from_env()?;
//!
//! // 2. Pick the session store
//! let store = SessionBackend::connect(config.store_config()).await?;
//!
//! // 3. Mount the routes
//! let app = axum::Router::new().merge(router(AuthState::new(config, store)?));
//!
//! // 4. Use `SessionUser` or `BearerIdentity` in your own handlers
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod routes;
mod state;

pub use config::AuthConfig;
pub use error::AuthError;
pub use extractor::{BearerIdentity, SessionUser};
pub use routes::{api_routes, auth_routes, router};
pub use state::AuthState;

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
