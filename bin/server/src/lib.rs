//! gatehouse web server.
//!
//! This crate wires the session store and OIDC support from
//! `gatehouse-platform-access` into an axum application:
//! - Configuration loading (`config`)
//! - A filter chain mounted per route (`pipeline`)
//! - The anonymous and OIDC authentication providers (`auth`)
//! - Route registration (`routes`)

pub mod auth;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod routes;

pub use auth::{AppState, AuthProvider};
pub use config::ServerConfig;
pub use routes::router;
