//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from an optional file overlaid with
//! environment variables. Nested keys use `__` as the separator, so
//! `OIDC__CLIENT_ID` sets `oidc.client_id`.
//!
//! See [`OidcConfig`](gatehouse_platform_access::OidcConfig) for the
//! identity provider settings.

use gatehouse_platform_access::OidcConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable naming an optional configuration file.
pub const CONFIG_FILE_ENV: &str = "GATEHOUSE_CONFIG";

/// Which authentication provider gates `/login`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProviderKind {
    /// Every session that asks is authenticated.
    Anonymous,
    /// Sessions are authenticated through the OIDC authorization-code flow.
    Oidc,
}

/// Where session state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionProviderKind {
    /// Process memory; sessions do not survive a restart.
    Memory,
}

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Directory served under `/static`.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Authentication provider selection.
    pub auth_provider: AuthProviderKind,

    /// Session store selection.
    pub session_provider: SessionProviderKind,

    /// OIDC configuration, required when `auth_provider` is `oidc`.
    #[serde(default)]
    pub oidc: Option<OidcConfig>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Loads configuration from `file`, if given, with environment
    /// variables taking precedence.
    ///
    /// The file format is inferred from its extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or if required
    /// configuration is missing or invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Self = builder
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the settings the selected providers depend on.
    ///
    /// # Errors
    ///
    /// Returns an error if OIDC is selected without a usable `oidc` section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.auth_provider, &self.oidc) {
            (AuthProviderKind::Oidc, None) => Err(ConfigError::MissingOidc),
            (_, Some(oidc)) => oidc
                .validate()
                .map_err(|reason| ConfigError::InvalidOidc { reason }),
            (AuthProviderKind::Anonymous, None) => Ok(()),
        }
    }

    /// Path of the configuration file named by [`CONFIG_FILE_ENV`], if set.
    #[must_use]
    pub fn file_from_env() -> Option<PathBuf> {
        std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from)
    }
}
