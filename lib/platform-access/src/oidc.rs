//! OpenID Connect configuration and protocol support.
//!
//! The configuration is built once at startup and shared read-only by the
//! authentication provider and the callback handler. Endpoint locations follow
//! the Okta org authorization server layout (`/oauth2/v1/...`) under the
//! provider domain.

pub mod claims;
pub mod client;
pub mod jose;
pub mod verify;

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::oidc::claims::ClaimExpectations;

/// Configuration for the OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Clone, Deserialize)]
pub struct OidcConfig {
    /// Externally reachable base URI of this application.
    application_uri: Url,
    /// Base URI of the identity provider.
    domain: Url,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// JOSE `typ` the provider stamps on access tokens, if it uses a
    /// non-standard one. Okta uses `application/okta-internal-at+jwt`.
    #[serde(default)]
    token_type: Option<String>,
    /// Expected `iss` claim. Defaults to the provider domain.
    #[serde(default)]
    issuer: Option<String>,
    /// Expected `aud` claim. Defaults to the provider domain.
    #[serde(default)]
    audience: Option<String>,
    /// Upper bound on each outbound request to the provider.
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    10
}

impl OidcConfig {
    /// Creates a new OIDC configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        application_uri: Url,
        domain: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            application_uri,
            domain,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_type: None,
            issuer: None,
            audience: None,
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    /// Requires access tokens to carry this JOSE `typ`.
    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// Overrides the expected issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Overrides the expected audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the outbound request timeout, rounded up to whole seconds.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        let partial = u64::from(timeout.subsec_nanos() > 0);
        self.request_timeout_seconds = timeout.as_secs().saturating_add(partial);
        self
    }

    /// Returns the application base URI.
    #[must_use]
    pub fn application_uri(&self) -> &Url {
        &self.application_uri
    }

    /// Returns the identity provider base URI.
    #[must_use]
    pub fn domain(&self) -> &Url {
        &self.domain
    }

    /// Returns the client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the JOSE `typ` required on access tokens, if any.
    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    /// Returns the outbound request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Where the provider sends the browser back to.
    #[must_use]
    pub fn callback_uri(&self) -> Url {
        join_path(&self.application_uri, &["oidc", "callback"])
    }

    #[must_use]
    pub fn authorization_endpoint(&self) -> Url {
        join_path(&self.domain, &["oauth2", "v1", "authorize"])
    }

    #[must_use]
    pub fn token_endpoint(&self) -> Url {
        join_path(&self.domain, &["oauth2", "v1", "token"])
    }

    #[must_use]
    pub fn jwks_endpoint(&self) -> Url {
        join_path(&self.domain, &["oauth2", "v1", "keys"])
    }

    /// Claim values a token from this provider must carry.
    #[must_use]
    pub fn claim_expectations(&self) -> ClaimExpectations {
        let domain = domain_identifier(&self.domain);
        ClaimExpectations {
            issuer: self.issuer.clone().unwrap_or_else(|| domain.clone()),
            audience: self.audience.clone().unwrap_or(domain),
        }
    }

    /// Checks that both URIs can carry the endpoint paths built from them.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending setting.
    pub fn validate(&self) -> Result<(), String> {
        for (key, uri) in [
            ("application_uri", &self.application_uri),
            ("domain", &self.domain),
        ] {
            if !matches!(uri.scheme(), "http" | "https") {
                return Err(format!("{key} must be an http or https URI, got '{uri}'"));
            }
            if uri.cannot_be_a_base() {
                return Err(format!("{key} must be a hierarchical URI, got '{uri}'"));
            }
        }

        if self.client_id.is_empty() {
            return Err("client_id must not be empty".to_string());
        }

        if self.request_timeout_seconds == 0 {
            return Err("request_timeout_seconds must be greater than zero".to_string());
        }

        Ok(())
    }
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("application_uri", &self.application_uri.as_str())
            .field("domain", &self.domain.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Appends path segments to `base`, tolerating a trailing slash on it.
fn join_path(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// The domain as issuers write it: no trailing slash on a bare host.
fn domain_identifier(domain: &Url) -> String {
    domain.as_str().trim_end_matches('/').to_string()
}
