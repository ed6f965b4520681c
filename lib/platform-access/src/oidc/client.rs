//! Authorization-code flow requests against the identity provider.
//!
//! Building the authorization redirect is pure. The token exchange and key
//! retrieval each issue exactly one request on the caller's task, with no
//! retries; any failure is returned to the caller as-is.

use gatehouse_core::Result;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::error::OidcError;
use crate::oidc::OidcConfig;
use crate::oidc::jose::Jwks;

/// Scopes requested on every authorization redirect.
pub const SCOPES: &str = "openid profile";

/// Inputs to the authorization redirect.
#[derive(Debug, Clone)]
pub struct RedirectSettings {
    pub callback_uri: Url,
    pub auth_endpoint: Url,
    pub client_id: String,
    /// Opaque value the provider echoes back to the callback.
    pub state: String,
}

impl RedirectSettings {
    /// Settings for `config`'s provider carrying `state`.
    #[must_use]
    pub fn from_config(config: &OidcConfig, state: impl Into<String>) -> Self {
        Self {
            callback_uri: config.callback_uri(),
            auth_endpoint: config.authorization_endpoint(),
            client_id: config.client_id().to_string(),
            state: state.into(),
        }
    }
}

/// Inputs to the authorization code exchange.
#[derive(Clone)]
pub struct TokenRequest {
    pub callback_uri: Url,
    pub token_endpoint: Url,
    pub auth_code: String,
    pub client_id: String,
    pub client_secret: String,
}

impl TokenRequest {
    /// A request redeeming `auth_code` with `config`'s client credentials.
    #[must_use]
    pub fn from_config(config: &OidcConfig, auth_code: impl Into<String>) -> Self {
        Self {
            callback_uri: config.callback_uri(),
            token_endpoint: config.token_endpoint(),
            auth_code: auth_code.into(),
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().to_string(),
        }
    }
}

/// Successful token endpoint response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub token_type: String,
    #[serde(rename = "expires_in", default)]
    pub expiry_seconds: u64,
    pub access_token: String,
}

impl std::fmt::Debug for AccessTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenResponse")
            .field("token_type", &self.token_type)
            .field("expiry_seconds", &self.expiry_seconds)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Builds the URL that sends the browser to the provider's login page.
#[must_use]
pub fn authorization_url(settings: &RedirectSettings) -> Url {
    let mut url = settings.auth_endpoint.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair("response_type", "code")
        .append_pair("scope", SCOPES)
        .append_pair("client_id", &settings.client_id)
        .append_pair("state", &settings.state)
        .append_pair("redirect_uri", settings.callback_uri.as_str());
    url
}

/// Redeems an authorization code at the token endpoint.
///
/// Parameters travel in the query string with an empty form body; client
/// credentials go in a Basic authorization header, each form-escaped first.
///
/// # Errors
///
/// Returns an [`OidcError`] report if the request fails, the provider does
/// not answer `200 OK`, or the body is not a token response.
#[instrument(skip_all, fields(endpoint = %request.token_endpoint))]
pub async fn request_token(
    http: &reqwest::Client,
    request: &TokenRequest,
) -> Result<AccessTokenResponse, OidcError> {
    let mut endpoint = request.token_endpoint.clone();
    endpoint
        .query_pairs_mut()
        .clear()
        .append_pair("grant_type", "authorization_code")
        .append_pair("code", &request.auth_code)
        .append_pair("redirect_uri", request.callback_uri.as_str());

    let response = http
        .post(endpoint)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .basic_auth(
            form_escape(&request.client_id),
            Some(form_escape(&request.client_secret)),
        )
        .body(Vec::new())
        .send()
        .await
        .map_err(|e| transport_error(&request.token_endpoint, &e))?;

    let token = decode_ok_response(&request.token_endpoint, response).await?;
    debug!("redeemed authorization code");
    Ok(token)
}

/// Fetches the provider's published signing keys.
///
/// # Errors
///
/// Returns an [`OidcError`] report if the request fails, the provider does
/// not answer `200 OK`, or the body is not a key set.
#[instrument(skip_all, fields(endpoint = %endpoint))]
pub async fn request_jwks(http: &reqwest::Client, endpoint: &Url) -> Result<Jwks, OidcError> {
    let response = http
        .get(endpoint.clone())
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| transport_error(endpoint, &e))?;

    let keys: Jwks = decode_ok_response(endpoint, response).await?;
    debug!(keys = keys.keys.len(), "retrieved signing keys");
    Ok(keys)
}

async fn decode_ok_response<T>(endpoint: &Url, response: reqwest::Response) -> Result<T, OidcError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if status != StatusCode::OK {
        return Err(OidcError::UnexpectedStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        }
        .into());
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(endpoint, &e))?;

    serde_json::from_slice(&body).map_err(|e| {
        OidcError::Decode {
            endpoint: endpoint.to_string(),
            details: e.to_string(),
        }
        .into()
    })
}

fn transport_error(endpoint: &Url, error: &reqwest::Error) -> OidcError {
    let details = if error.is_timeout() {
        "timed out".to_string()
    } else {
        error.to_string()
    };
    OidcError::Transport {
        endpoint: endpoint.to_string(),
        details,
    }
}

/// `application/x-www-form-urlencoded` escaping, as applied to credentials
/// before Basic encoding.
fn form_escape(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}
