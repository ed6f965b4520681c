//! Completion of the OIDC authorization-code flow.
//!
//! Each step fails closed: the first failure ends the request and the
//! browser has to start again from `/login`. Nothing is retried.

use axum::extract::{Query, State};
use axum::http::{HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use gatehouse_core::SessionId;
use gatehouse_platform_access::oidc::client::{TokenRequest, request_jwks, request_token};
use gatehouse_platform_access::oidc::jose::{decode_jose_header, header_segment};
use gatehouse_platform_access::oidc::verify::{check_token_type, verify_access_token};
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;

use super::{OidcProvider, found};
use crate::error::CallbackError;
use crate::pipeline::{SESSION_COOKIE, session_cookie};

/// Query parameters the identity provider redirects back with.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

/// Redeems the authorization code, verifies the access token and upgrades
/// the session, then redirects to the URI carried in `state`.
///
/// The query is parsed only once a session cookie is known to be present.
pub async fn callback(
    State(provider): State<OidcProvider>,
    jar: CookieJar,
    uri: Uri,
) -> Result<Response, CallbackError> {
    let session = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| SessionId::from_str(cookie.value()).ok())
        .ok_or(CallbackError::NoSession)?;

    let Query(params) =
        Query::<CallbackParams>::try_from_uri(&uri).map_err(|e| CallbackError::InvalidQuery {
            details: e.body_text(),
        })?;

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or(CallbackError::MissingCode)?;

    let config = provider.config();

    let token = request_token(&provider.http, &TokenRequest::from_config(config, code))
        .await
        .map_err(|e| CallbackError::TokenRequest {
            details: e.to_string(),
        })?;

    let keys = request_jwks(&provider.http, &config.jwks_endpoint())
        .await
        .map_err(|e| CallbackError::KeyRetrieval {
            details: e.to_string(),
        })?;

    let segment =
        header_segment(&token.access_token).map_err(|e| CallbackError::MalformedToken {
            details: e.to_string(),
        })?;

    let header = decode_jose_header(segment).map_err(|e| CallbackError::HeaderDecode {
        details: e.to_string(),
    })?;

    check_token_type(&header, config.token_type()).map_err(|e| {
        CallbackError::UnsupportedTokenType {
            details: e.to_string(),
        }
    })?;

    verify_access_token(
        &token.access_token,
        &header,
        &keys,
        &config.claim_expectations(),
        Utc::now(),
    )
    .map_err(|e| CallbackError::Unverified {
        details: e.to_string(),
    })?;

    // Must be a valid Location before the session is touched
    let destination = params
        .state
        .filter(|state| !state.is_empty())
        .and_then(|state| HeaderValue::from_str(&state).ok())
        .ok_or(CallbackError::MissingState)?;

    let rotated = provider
        .sessions
        .upgrade(&session)
        .map_err(|e| CallbackError::Upgrade {
            details: e.to_string(),
        })?;

    info!("authenticated session through OIDC");
    Ok((jar.add(session_cookie(&rotated)), found(destination)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::StatusCode;
    use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
    use gatehouse_platform_access::test_support::TokenSigner;
    use gatehouse_platform_access::{InMemorySessionStore, OidcConfig, SessionStore};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        idp: MockServer,
        store: Arc<InMemorySessionStore>,
        router: axum::Router,
    }

    impl Harness {
        async fn start() -> Self {
            let idp = MockServer::start().await;
            let config = OidcConfig::new(
                Url::parse("http://localhost:8080").expect("application uri"),
                Url::parse(&idp.uri()).expect("domain"),
                "client",
                "secret",
            );
            let store = Arc::new(InMemorySessionStore::new());
            let provider = OidcProvider::new(config, store.clone()).expect("provider");
            let router = provider.register_routes(axum::Router::new());
            Self { idp, store, router }
        }

        fn issuer(&self) -> String {
            self.idp.uri().trim_end_matches('/').to_string()
        }

        async fn serve_token(&self, access_token: &str) {
            Mock::given(method("POST"))
                .and(path("/oauth2/v1/token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "access_token": access_token,
                })))
                .mount(&self.idp)
                .await;
        }

        async fn serve_keys(&self) {
            Mock::given(method("GET"))
                .and(path("/oauth2/v1/keys"))
                .respond_with(ResponseTemplate::new(200).set_body_json(TokenSigner::shared().jwks()))
                .mount(&self.idp)
                .await;
        }

        fn valid_token(&self) -> String {
            let now = Utc::now().timestamp();
            TokenSigner::shared().sign(&json!({
                "jti": "AT.1",
                "iss": self.issuer(),
                "aud": self.issuer(),
                "sub": "00u1",
                "iat": now,
                "exp": now + 3600,
            }))
        }

        async fn call(&self, uri: &str, session: Option<&SessionId>) -> Response {
            let mut builder = axum::http::Request::builder().uri(uri);
            if let Some(id) = session {
                builder = builder.header(COOKIE, format!("id={id}"));
            }
            let request: Request = builder.body(Body::empty()).expect("request");
            self.router.clone().oneshot(request).await.expect("infallible")
        }
    }

    #[tokio::test]
    async fn upgrades_session_and_returns_to_state() {
        let harness = Harness::start().await;
        harness.serve_token(&harness.valid_token()).await;
        harness.serve_keys().await;
        let session = harness.store.create();

        let response = harness
            .call("/oidc/callback?code=abc&state=%2Flogin", Some(&session))
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/login");
        let cookie = response.headers()[SET_COOKIE].to_str().expect("ascii");
        let rotated: SessionId = cookie
            .strip_prefix("id=")
            .and_then(|rest| rest.split(';').next())
            .expect("session cookie")
            .parse()
            .expect("session id");
        assert!(!harness.store.exists(&session));
        assert_eq!(harness.store.authenticated(&rotated), Ok(true));
    }

    #[tokio::test]
    async fn trailing_slash_route_is_registered() {
        let harness = Harness::start().await;
        let session = harness.store.create();

        let response = harness.call("/oidc/callback/?state=%2F", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_cookie_is_unauthorized() {
        let harness = Harness::start().await;
        let response = harness.call("/oidc/callback?code=abc&state=%2F", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_code_is_bad_request_without_mutation() {
        let harness = Harness::start().await;
        let session = harness.store.create();

        let response = harness
            .call("/oidc/callback?code=&state=%2F", Some(&session))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert!(harness.store.exists(&session));
        assert_eq!(harness.store.authenticated(&session), Ok(false));
    }

    #[tokio::test]
    async fn token_endpoint_failure_is_server_error() {
        let harness = Harness::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&harness.idp)
            .await;
        let session = harness.store.create();

        let response = harness
            .call("/oidc/callback?code=abc&state=%2F", Some(&session))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(harness.store.exists(&session));
    }

    #[tokio::test]
    async fn key_retrieval_failure_is_server_error() {
        let harness = Harness::start().await;
        harness.serve_token(&harness.valid_token()).await;
        Mock::given(method("GET"))
            .and(path("/oauth2/v1/keys"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&harness.idp)
            .await;
        let session = harness.store.create();

        let response = harness
            .call("/oidc/callback?code=abc&state=%2F", Some(&session))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn token_without_segments_is_server_error() {
        let harness = Harness::start().await;
        harness.serve_token("opaque-token").await;
        harness.serve_keys().await;
        let session = harness.store.create();

        let response = harness
            .call("/oidc/callback?code=abc&state=%2F", Some(&session))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(harness.store.exists(&session));
    }

    #[tokio::test]
    async fn unverifiable_token_is_server_error() {
        let harness = Harness::start().await;
        let stranger = TokenSigner::generate(TokenSigner::shared().key_id());
        let now = Utc::now().timestamp();
        let forged = stranger.sign(&json!({
            "iss": harness.issuer(),
            "aud": harness.issuer(),
            "iat": now,
            "exp": now + 3600,
        }));
        harness.serve_token(&forged).await;
        harness.serve_keys().await;
        let session = harness.store.create();

        let response = harness
            .call("/oidc/callback?code=abc&state=%2F", Some(&session))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(harness.store.authenticated(&session), Ok(false));
    }

    #[tokio::test]
    async fn missing_state_is_bad_request_after_verification() {
        let harness = Harness::start().await;
        harness.serve_token(&harness.valid_token()).await;
        harness.serve_keys().await;
        let session = harness.store.create();

        let response = harness.call("/oidc/callback?code=abc", Some(&session)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(harness.store.authenticated(&session), Ok(false));
    }

    #[tokio::test]
    async fn unusable_state_is_bad_request_without_mutation() {
        let harness = Harness::start().await;
        harness.serve_token(&harness.valid_token()).await;
        harness.serve_keys().await;
        let session = harness.store.create();

        let response = harness
            .call("/oidc/callback?code=abc&state=%2F%0Aevil", Some(&session))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert!(response.headers().get(LOCATION).is_none());
        assert!(harness.store.exists(&session));
        assert_eq!(harness.store.authenticated(&session), Ok(false));
        assert_eq!(harness.store.len(), 1);
    }

    #[tokio::test]
    async fn missing_cookie_wins_over_malformed_query() {
        let harness = Harness::start().await;

        let response = harness.call("/oidc/callback?code=a&code=b", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_query_is_bad_request() {
        let harness = Harness::start().await;
        let session = harness.store.create();

        let response = harness
            .call("/oidc/callback?code=a&code=b", Some(&session))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.store.exists(&session));
        let requests = harness.idp.received_requests().await.unwrap_or_default();
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn post_is_rejected() {
        let harness = Harness::start().await;
        let request: Request = axum::http::Request::builder()
            .method("POST")
            .uri("/oidc/callback?code=abc&state=%2F")
            .body(Body::empty())
            .expect("request");

        let response = harness.router.clone().oneshot(request).await.expect("infallible");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
