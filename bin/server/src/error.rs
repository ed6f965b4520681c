//! Error types for server operations.
//!
//! Configuration errors are fatal at startup. Filter and callback errors are
//! terminal for the request and become a status code with a plain-text body;
//! server-side failures are logged before the body is sent.

use axum::http::header::ALLOW;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::fmt;

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// A source could not be read or did not deserialize.
    Load { details: String },
    /// `auth_provider = oidc` without an `oidc` section.
    MissingOidc,
    /// The `oidc` section is present but unusable.
    InvalidOidc { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { details } => write!(f, "failed to load configuration: {}", details),
            Self::MissingOidc => write!(
                f,
                "auth_provider is 'oidc' but no oidc configuration was provided"
            ),
            Self::InvalidOidc { reason } => write!(f, "invalid oidc configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        Self::Load {
            details: e.to_string(),
        }
    }
}

/// Rejections produced by pipeline filters.
#[derive(Debug)]
pub enum FilterError {
    /// The request method is outside the route's allow-set.
    MethodNotAllowed { allowed: Vec<Method> },
    /// Authentication was attempted before any session was established.
    NotSessionManaged,
    /// The session could not be rotated to authenticated.
    UpgradeFailed { details: String },
    /// The store could not say whether the session is authenticated.
    SessionCheck { details: String },
    /// A redirect target is not a valid `Location` header value.
    InvalidRedirect { details: String },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MethodNotAllowed { allowed } => {
                write!(f, "method not allowed, expected one of {:?}", allowed)
            }
            Self::NotSessionManaged => write!(f, "request is not session managed"),
            Self::UpgradeFailed { details } => {
                write!(f, "session upgrade failed: {}", details)
            }
            Self::SessionCheck { details } => {
                write!(f, "session status check failed: {}", details)
            }
            Self::InvalidRedirect { details } => {
                write!(f, "invalid redirect target: {}", details)
            }
        }
    }
}

impl std::error::Error for FilterError {}

impl IntoResponse for FilterError {
    fn into_response(self) -> Response {
        match self {
            Self::MethodNotAllowed { allowed } => {
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut response = (
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Invalid HTTP method presented to endpoint",
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    response.headers_mut().insert(ALLOW, value);
                }
                response
            }
            Self::NotSessionManaged => (
                StatusCode::UNAUTHORIZED,
                "Attempted authentication on request that is not session managed",
            )
                .into_response(),
            Self::UpgradeFailed { details } => {
                tracing::error!("Session upgrade failed: {}", details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to upgrade session to authenticated",
                )
                    .into_response()
            }
            Self::SessionCheck { details } => {
                tracing::error!("Session status check failed: {}", details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to check session authentication status",
                )
                    .into_response()
            }
            Self::InvalidRedirect { details } => {
                tracing::error!("Invalid redirect target: {}", details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to redirect to identity provider",
                )
                    .into_response()
            }
        }
    }
}

/// OIDC callback failures, one per stage of the handshake.
#[derive(Debug)]
pub enum CallbackError {
    /// No session cookie accompanied the callback.
    NoSession,
    /// The query string did not parse.
    InvalidQuery { details: String },
    /// The provider redirected back without an authorization code.
    MissingCode,
    /// The authorization code could not be redeemed.
    TokenRequest { details: String },
    /// The provider's signing keys could not be retrieved.
    KeyRetrieval { details: String },
    /// The access token has no header segment.
    MalformedToken { details: String },
    /// The access token's header did not decode.
    HeaderDecode { details: String },
    /// The access token is not of the configured type.
    UnsupportedTokenType { details: String },
    /// No published key verified the token with acceptable claims.
    Unverified { details: String },
    /// The provider did not echo a usable `state` to return to.
    MissingState,
    /// The session could not be rotated to authenticated.
    Upgrade { details: String },
}

impl CallbackError {
    /// Status code the browser receives for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoSession => StatusCode::UNAUTHORIZED,
            Self::InvalidQuery { .. } | Self::MissingCode | Self::MissingState => {
                StatusCode::BAD_REQUEST
            }
            Self::TokenRequest { .. }
            | Self::KeyRetrieval { .. }
            | Self::MalformedToken { .. }
            | Self::HeaderDecode { .. }
            | Self::UnsupportedTokenType { .. }
            | Self::Unverified { .. }
            | Self::Upgrade { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::NoSession => "OIDC handshake attempted without a configured session",
            Self::InvalidQuery { .. } => "Callback received with malformed parameters",
            Self::MissingCode => "Callback received without auth code",
            Self::TokenRequest { .. } => "Unable to perform OIDC token request",
            Self::KeyRetrieval { .. } => "Unable to perform JWKS retrieval",
            Self::MalformedToken { .. } => "Received token cannot possibly be valid",
            Self::HeaderDecode { .. } => "Unable to parse JOSE header from OIDC token",
            Self::UnsupportedTokenType { .. } => "Received token is not a verifiable access token",
            Self::Unverified { .. } => "Access token could not be verified",
            Self::MissingState => "Attempted callback without proper OIDC state",
            Self::Upgrade { .. } => "Failed to upgrade session to authenticated",
        }
    }

    fn details(&self) -> Option<&str> {
        match self {
            Self::InvalidQuery { details }
            | Self::TokenRequest { details }
            | Self::KeyRetrieval { details }
            | Self::MalformedToken { details }
            | Self::HeaderDecode { details }
            | Self::UnsupportedTokenType { details }
            | Self::Unverified { details }
            | Self::Upgrade { details } => Some(details),
            Self::NoSession | Self::MissingCode | Self::MissingState => None,
        }
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details() {
            Some(details) => write!(f, "{}: {}", self.message(), details),
            None => f.write_str(self.message()),
        }
    }
}

impl std::error::Error for CallbackError {}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "OIDC callback failed");
        } else {
            tracing::info!(error = %self, "OIDC callback rejected");
        }

        (status, self.message()).into_response()
    }
}
