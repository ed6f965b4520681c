//! Authentication for the gatehouse server.
//!
//! This module provides:
//! - The authentication providers gating `/login` (anonymous and OIDC)
//! - The OIDC callback handler that completes the authorization-code flow
//! - Shared application state, built once from configuration
//!
//! Providers are selected at startup. Whichever is active, a successful
//! authentication rotates the session ID, so a cookie planted before login
//! is worthless afterwards.

pub mod anonymous;
pub mod callback;
pub mod oidc;

pub use anonymous::AnonymousProvider;
pub use oidc::OidcProvider;

use axum::Router;
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use gatehouse_platform_access::{InMemorySessionStore, SessionStore};
use std::sync::Arc;

use crate::config::{AuthProviderKind, ServerConfig, SessionProviderKind};
use crate::error::ConfigError;
use crate::pipeline::{Exchange, Flow};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Session store shared by every route.
    pub sessions: Arc<dyn SessionStore>,
    /// Provider that authenticates sessions at `/login`.
    pub provider: AuthProvider,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(sessions: Arc<dyn SessionStore>, provider: AuthProvider) -> Self {
        Self { sessions, provider }
    }

    /// Builds the session store and provider `config` selects.
    ///
    /// # Errors
    ///
    /// Returns an error if the OIDC provider cannot be constructed.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let sessions: Arc<dyn SessionStore> = match config.session_provider {
            SessionProviderKind::Memory => Arc::new(InMemorySessionStore::new()),
        };

        let provider = match (config.auth_provider, &config.oidc) {
            (AuthProviderKind::Anonymous, _) => {
                AuthProvider::Anonymous(AnonymousProvider::new(sessions.clone()))
            }
            (AuthProviderKind::Oidc, Some(oidc)) => {
                AuthProvider::Oidc(OidcProvider::new(oidc.clone(), sessions.clone())?)
            }
            (AuthProviderKind::Oidc, None) => return Err(ConfigError::MissingOidc),
        };

        Ok(Self::new(sessions, provider))
    }
}

/// The active authentication provider.
#[derive(Clone)]
pub enum AuthProvider {
    Anonymous(AnonymousProvider),
    Oidc(OidcProvider),
}

impl AuthProvider {
    /// Authenticates the exchange's session.
    ///
    /// [`Flow::Continue`] means the session is now authenticated and the
    /// chain may proceed; otherwise the response ends the request.
    pub async fn authenticate(&self, exchange: &mut Exchange) -> Flow {
        match self {
            Self::Anonymous(provider) => provider.authenticate(exchange),
            Self::Oidc(provider) => provider.authenticate(exchange),
        }
    }

    /// Adds any routes the provider needs to `router`.
    #[must_use]
    pub fn register_routes(&self, router: Router) -> Router {
        match self {
            Self::Anonymous(_) => router,
            Self::Oidc(provider) => provider.register_routes(router),
        }
    }
}

/// A `302 Found` redirect to `location`.
///
/// Takes an already validated header value, so the redirect can never go out
/// without its `Location`. axum's `Redirect` offers 303, 307 and 308 but not
/// 302.
pub(crate) fn found(location: HeaderValue) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}
