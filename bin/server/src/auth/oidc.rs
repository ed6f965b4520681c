//! Provider that authenticates sessions through an OIDC identity provider.

use axum::Router;
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use gatehouse_platform_access::oidc::client::{RedirectSettings, authorization_url};
use gatehouse_platform_access::{OidcConfig, SessionStore};
use std::sync::Arc;
use tracing::debug;

use super::{callback, found};
use crate::error::{ConfigError, FilterError};
use crate::pipeline::{Chain, Exchange, Flow, MethodFilter, TerminalHandler};

/// Path the identity provider redirects back to.
pub const CALLBACK_PATH: &str = "/oidc/callback";

/// Sends unauthenticated sessions to the identity provider and completes
/// the flow at [`CALLBACK_PATH`].
#[derive(Clone)]
pub struct OidcProvider {
    pub(crate) config: Arc<OidcConfig>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) http: reqwest::Client,
}

impl OidcProvider {
    /// Creates the provider and its outbound HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate or the HTTP
    /// client cannot be built.
    pub fn new(config: OidcConfig, sessions: Arc<dyn SessionStore>) -> Result<Self, ConfigError> {
        config
            .validate()
            .map_err(|reason| ConfigError::InvalidOidc { reason })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::InvalidOidc {
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            config: Arc::new(config),
            sessions,
            http,
        })
    }

    #[must_use]
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Redirects to the authorization endpoint, carrying the requested URI
    /// as `state` so the callback can return there.
    pub(crate) fn authenticate(&self, exchange: &mut Exchange) -> Flow {
        let state = exchange.request().uri().to_string();
        let url = authorization_url(&RedirectSettings::from_config(&self.config, state));
        match HeaderValue::from_str(url.as_str()) {
            Ok(location) => {
                debug!(
                    endpoint = %self.config.authorization_endpoint(),
                    "redirecting to identity provider"
                );
                Flow::Stop(found(location))
            }
            Err(e) => Flow::Stop(
                FilterError::InvalidRedirect {
                    details: e.to_string(),
                }
                .into_response(),
            ),
        }
    }

    pub(crate) fn register_routes(&self, router: Router) -> Router {
        let chain = Chain::builder()
            .filter(MethodFilter::read_only())
            .filter(TerminalHandler::with_state(
                callback::callback,
                self.clone(),
            ))
            .build();

        router
            .route_service(CALLBACK_PATH, chain.clone())
            .route_service(&format!("{CALLBACK_PATH}/"), chain)
    }
}
