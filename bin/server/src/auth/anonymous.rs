//! Provider that authenticates any session that asks.

use axum::response::IntoResponse;
use gatehouse_platform_access::SessionStore;
use std::sync::Arc;
use tracing::info;

use crate::error::FilterError;
use crate::pipeline::{Exchange, Flow};

/// Upgrades the request's session without checking any credentials.
///
/// Relies on an earlier filter having established the session.
#[derive(Clone)]
pub struct AnonymousProvider {
    sessions: Arc<dyn SessionStore>,
}

impl AnonymousProvider {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }

    pub(crate) fn authenticate(&self, exchange: &mut Exchange) -> Flow {
        let Some(id) = exchange.session_cookie() else {
            return Flow::Stop(FilterError::NotSessionManaged.into_response());
        };

        match self.sessions.upgrade(&id) {
            Ok(rotated) => {
                info!("authenticated session anonymously");
                exchange.issue_session_cookie(rotated);
                Flow::Continue
            }
            Err(e) => Flow::Stop(
                FilterError::UpgradeFailed {
                    details: e.to_string(),
                }
                .into_response(),
            ),
        }
    }
}
