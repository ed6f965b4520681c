//! Standard filters.

use async_trait::async_trait;
use axum::Router;
use axum::handler::Handler;
use axum::http::Method;
use axum::response::IntoResponse;
use gatehouse_core::SessionId;
use gatehouse_platform_access::SessionStore;
use std::sync::Arc;
use tower::ServiceExt;
use tracing::info;

use super::{Exchange, Filter, Flow};
use crate::auth::AuthProvider;
use crate::error::FilterError;

/// Rejects requests whose method is outside an allow-set.
#[derive(Debug, Clone)]
pub struct MethodFilter {
    allowed: Vec<Method>,
}

impl MethodFilter {
    #[must_use]
    pub fn new(allowed: impl IntoIterator<Item = Method>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Allows only `GET` and `HEAD`.
    #[must_use]
    pub fn read_only() -> Self {
        Self::new([Method::GET, Method::HEAD])
    }
}

#[async_trait]
impl Filter for MethodFilter {
    async fn apply(&self, exchange: &mut Exchange) -> Flow {
        if self.allowed.contains(exchange.request().method()) {
            Flow::Continue
        } else {
            Flow::Stop(
                FilterError::MethodNotAllowed {
                    allowed: self.allowed.clone(),
                }
                .into_response(),
            )
        }
    }
}

/// Reuses the request's session, or creates an anonymous one and issues its
/// cookie when the request has none the store recognises.
fn bootstrap_session(sessions: &dyn SessionStore, exchange: &mut Exchange) -> SessionId {
    if let Some(id) = exchange.session_cookie().filter(|id| sessions.exists(id)) {
        exchange.set_active_session(id.clone());
        return id;
    }

    let id = sessions.create();
    info!("created anonymous session");
    exchange.issue_session_cookie(id.clone());
    id
}

/// Ensures every request carries a session, without requiring it to be
/// authenticated.
#[derive(Clone)]
pub struct SessionFilter {
    sessions: Arc<dyn SessionStore>,
}

impl SessionFilter {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Filter for SessionFilter {
    async fn apply(&self, exchange: &mut Exchange) -> Flow {
        bootstrap_session(self.sessions.as_ref(), exchange);
        Flow::Continue
    }
}

/// Lets authenticated sessions through and hands the rest to the
/// authentication provider.
#[derive(Clone)]
pub struct AuthenticationFilter {
    sessions: Arc<dyn SessionStore>,
    provider: AuthProvider,
}

impl AuthenticationFilter {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>, provider: AuthProvider) -> Self {
        Self { sessions, provider }
    }
}

#[async_trait]
impl Filter for AuthenticationFilter {
    async fn apply(&self, exchange: &mut Exchange) -> Flow {
        let id = bootstrap_session(self.sessions.as_ref(), exchange);

        match self.sessions.authenticated(&id) {
            Ok(true) => Flow::Continue,
            Ok(false) => self.provider.authenticate(exchange).await,
            Err(e) => Flow::Stop(
                FilterError::SessionCheck {
                    details: e.to_string(),
                }
                .into_response(),
            ),
        }
    }
}

/// Ends the chain by handing the request to an axum handler.
#[derive(Clone)]
pub struct TerminalHandler {
    router: Router,
}

impl TerminalHandler {
    /// Wraps a stateless handler.
    #[must_use]
    pub fn new<H, T>(handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self {
            router: Router::new().fallback(handler),
        }
    }

    /// Wraps a handler that extracts `State<S>`.
    #[must_use]
    pub fn with_state<H, T, S>(handler: H, state: S) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        Self {
            router: Router::new().fallback(handler).with_state(state),
        }
    }
}

#[async_trait]
impl Filter for TerminalHandler {
    async fn apply(&self, exchange: &mut Exchange) -> Flow {
        let request = exchange.take_request();
        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        Flow::Stop(response)
    }
}
