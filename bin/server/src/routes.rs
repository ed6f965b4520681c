//! Route registration.

use axum::Router;
use axum::extract::{Extension, State};
use axum::http::HeaderValue;
use axum::response::Response;
use std::path::Path;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::{AppState, found};
use crate::error::FilterError;
use crate::pipeline::{
    ActiveSession, AuthenticationFilter, Chain, MethodFilter, SessionFilter, TerminalHandler,
};

/// Builds the application router.
///
/// - `/` establishes a session and reports whether it is authenticated
/// - `/login` and `/login/` authenticate the session, then return to `/`
/// - `/static` serves files from `static_dir`
/// - the provider's own routes, such as the OIDC callback
pub fn router(state: AppState, static_dir: &Path) -> Router {
    let index_chain = Chain::builder()
        .filter(MethodFilter::read_only())
        .filter(SessionFilter::new(state.sessions.clone()))
        .filter(TerminalHandler::with_state(index, state.clone()))
        .build();

    let login_chain = Chain::builder()
        .filter(MethodFilter::read_only())
        .filter(AuthenticationFilter::new(
            state.sessions.clone(),
            state.provider.clone(),
        ))
        .filter(TerminalHandler::new(login_complete))
        .build();

    let router = Router::new()
        .route_service("/", index_chain)
        .route_service("/login", login_chain.clone())
        .route_service("/login/", login_chain)
        .nest_service("/static", ServeDir::new(static_dir));

    state
        .provider
        .register_routes(router)
        .layer(TraceLayer::new_for_http())
}

async fn index(
    State(state): State<AppState>,
    Extension(ActiveSession(id)): Extension<ActiveSession>,
) -> Result<&'static str, FilterError> {
    let authenticated = state
        .sessions
        .authenticated(&id)
        .map_err(|e| FilterError::SessionCheck {
            details: e.to_string(),
        })?;

    Ok(if authenticated {
        "You are signed in.\n"
    } else {
        "You are browsing anonymously.\n"
    })
}

async fn login_complete() -> Response {
    found(HeaderValue::from_static("/"))
}
