//! Sessions and OpenID Connect support for gatehouse.
//!
//! This crate provides:
//! - Visitor session tracking (`SessionStore`, `InMemorySessionStore`)
//! - OIDC provider configuration (`OidcConfig`)
//! - The authorization-code flow requests (`oidc::client`)
//! - JOSE/JWT decoding and RS256 verification (`oidc::jose`, `oidc::verify`)
//! - Claim validation (`oidc::claims`)
//!
//! Token verification does not defer to a JWT library: headers, key sets and
//! signatures are decoded and checked here, with `rsa` supplying only the
//! PKCS#1 v1.5 primitive.
//!
//! # Example
//!
//! ```
//! use gatehouse_platform_access::{InMemorySessionStore, SessionStore};
//!
//! let store = InMemorySessionStore::new();
//! let anonymous = store.create();
//! assert_eq!(store.authenticated(&anonymous), Ok(false));
//!
//! let authenticated = store.upgrade(&anonymous).expect("session exists");
//! assert_eq!(store.authenticated(&authenticated), Ok(true));
//! assert!(!store.exists(&anonymous));
//! ```

pub mod error;
pub mod oidc;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-export main types at crate root
pub use error::{ClaimError, JoseError, OidcError, SessionError};
pub use oidc::OidcConfig;
pub use session::{InMemorySessionStore, Session, SessionStore};
