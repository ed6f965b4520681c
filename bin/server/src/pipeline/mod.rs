//! Per-route filter chains.
//!
//! A [`Chain`] runs its filters in order against one [`Exchange`] and stops at
//! the first filter that produces a response. Chains are tower services, so
//! they mount with `Router::route_service` like any other handler.

pub mod filters;

pub use filters::{AuthenticationFilter, MethodFilter, SessionFilter, TerminalHandler};

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use futures::future::BoxFuture;
use gatehouse_core::SessionId;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "id";

/// Builds the session cookie for `id`.
///
/// `Secure` is left off so sessions work over plain HTTP during local
/// development.
#[must_use]
pub fn session_cookie(id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .build()
}

/// Outcome of a single filter.
#[derive(Debug)]
pub enum Flow {
    /// Hand the exchange to the next filter.
    Continue,
    /// End the chain with this response.
    Stop(Response),
}

/// One step of a [`Chain`].
///
/// A filter that returns [`Flow::Continue`] may have mutated the exchange but
/// must not have consumed the request.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn apply(&self, exchange: &mut Exchange) -> Flow;
}

/// Session the current request is acting as, once a filter has settled it.
///
/// Inserted into request extensions for terminal handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession(pub SessionId);

/// The in-flight request and the session cookie to send back with it.
#[derive(Debug)]
pub struct Exchange {
    request: Request,
    issued_session: Option<SessionId>,
}

impl Exchange {
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            request,
            issued_session: None,
        }
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The session this request carries.
    ///
    /// A cookie issued earlier in the chain wins over the one the browser
    /// sent, so later filters see the rotated ID. Values that could not have
    /// been generated are ignored.
    #[must_use]
    pub fn session_cookie(&self) -> Option<SessionId> {
        if let Some(id) = &self.issued_session {
            return Some(id.clone());
        }

        CookieJar::from_headers(self.request.headers())
            .get(SESSION_COOKIE)
            .and_then(|cookie| SessionId::from_str(cookie.value()).ok())
    }

    /// Records `id` as the request's session without changing the cookie.
    pub fn set_active_session(&mut self, id: SessionId) {
        self.request.extensions_mut().insert(ActiveSession(id));
    }

    /// Records `id` as the request's session and sends it back as the
    /// session cookie.
    pub fn issue_session_cookie(&mut self, id: SessionId) {
        self.set_active_session(id.clone());
        self.issued_session = Some(id);
    }

    /// Takes the request out of the exchange, leaving an empty one behind.
    pub fn take_request(&mut self) -> Request {
        std::mem::take(&mut self.request)
    }

    /// Attaches the issued session cookie, if any, to `response`.
    #[must_use]
    pub fn finish(self, response: Response) -> Response {
        match self.issued_session {
            Some(id) => (CookieJar::new().add(session_cookie(&id)), response).into_response(),
            None => response,
        }
    }
}

/// An ordered list of filters mounted at a route.
#[derive(Clone)]
pub struct Chain {
    filters: Arc<[Arc<dyn Filter>]>,
}

impl Chain {
    #[must_use]
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// Number of filters in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs `request` through the filters.
    ///
    /// If every filter continues, the response is an empty `200 OK`.
    pub async fn run(&self, request: Request) -> Response {
        let mut exchange = Exchange::new(request);

        for filter in self.filters.iter() {
            if let Flow::Stop(response) = filter.apply(&mut exchange).await {
                return exchange.finish(response);
            }
        }

        exchange.finish(StatusCode::OK.into_response())
    }
}

impl Service<Request> for Chain {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let chain = self.clone();
        Box::pin(async move { Ok(chain.run(request).await) })
    }
}

/// Builder for [`Chain`].
#[derive(Default)]
pub struct ChainBuilder {
    filters: Vec<Arc<dyn Filter>>,
}

impl ChainBuilder {
    /// Appends `filter` to the chain.
    #[must_use]
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn build(self) -> Chain {
        Chain {
            filters: self.filters.into(),
        }
    }
}
