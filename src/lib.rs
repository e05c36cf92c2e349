#![doc = include_str!("../README.md")]

pub mod discovery;
pub mod error;
pub mod flow;
pub mod gate;
pub mod logout;
pub mod middleware;
pub mod oauth;
pub mod pkce;
pub mod session;
pub mod store;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use discovery::{ProviderDiscovery, ProviderMetadata};
pub use error::Error;
pub use flow::LoginFlow;
pub use gate::{Authorization, HasRoles, authorize};
pub use logout::{LogoutCoordinator, LogoutOutcome, Revocation};
pub use oauth::{AuthClient, AuthorizationRequest, OidcConfig, TokenSet, UserProfile};
pub use pkce::{PkcePair, generate_state};
pub use session::{AuthenticatedSession, Session, SessionView};
pub use store::{SessionBackend, SessionStore, StoreConfig, StoreError};
pub use token::{IssuerMatch, KeySource, TokenValidator, ValidatedIdentity, ValidationStats};
pub use types::SessionId;
