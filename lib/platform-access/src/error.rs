//! Error types for the platform-access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `SessionError`: session store lookups and rotations
//! - `OidcError`: failures of a protocol step against the identity provider
//! - `JoseError`: structural or cryptographic failure for one token/key pair
//! - `ClaimError`: a verified token whose claims are not acceptable

use std::fmt;

/// Errors from session store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session exists under the requested ID.
    NotFound,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "session not found"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from an OIDC protocol step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcError {
    /// The request never produced a response (connect, TLS, timeout, body read).
    Transport { endpoint: String, details: String },
    /// The provider answered with something other than `200 OK`.
    UnexpectedStatus { endpoint: String, status: u16 },
    /// The response body could not be decoded.
    Decode { endpoint: String, details: String },
    /// The token is not a well-formed compact JWS.
    TokenMalformed { reason: String },
    /// The JOSE `typ` does not match what the provider issues for access tokens.
    UnsupportedTokenType {
        expected: String,
        found: Option<String>,
    },
    /// No key in the set produced a valid signature with acceptable claims.
    Unverified { candidates: usize },
}

impl fmt::Display for OidcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { endpoint, details } => {
                write!(f, "request to {endpoint} failed: {details}")
            }
            Self::UnexpectedStatus { endpoint, status } => {
                write!(f, "{endpoint} responded with status {status}")
            }
            Self::Decode { endpoint, details } => {
                write!(f, "could not decode response from {endpoint}: {details}")
            }
            Self::TokenMalformed { reason } => {
                write!(f, "malformed token: {reason}")
            }
            Self::UnsupportedTokenType { expected, found } => match found {
                Some(found) => write!(f, "token type '{found}' is not '{expected}'"),
                None => write!(f, "token type missing, expected '{expected}'"),
            },
            Self::Unverified { candidates } => {
                write!(
                    f,
                    "token could not be verified ({candidates} candidate keys tried)"
                )
            }
        }
    }
}

impl std::error::Error for OidcError {}

/// Errors from decoding or verifying a token against a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoseError {
    /// Segment structure, base64url or JSON is invalid.
    Malformed { reason: String },
    /// The JOSE header names an algorithm other than RS256.
    UnsupportedAlgorithm { algorithm: String },
    /// The JWK does not describe a usable RSA public key.
    InvalidKey { reason: String },
    /// The signature does not match the signed content under this key.
    SignatureInvalid,
}

impl JoseError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for JoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed JWT: {reason}"),
            Self::UnsupportedAlgorithm { algorithm } => {
                write!(f, "unsupported JOSE algorithm '{algorithm}'")
            }
            Self::InvalidKey { reason } => write!(f, "invalid signing key: {reason}"),
            Self::SignatureInvalid => write!(f, "signature does not match"),
        }
    }
}

impl std::error::Error for JoseError {}

/// A claim in a verified token failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    MissingIssuer,
    IssuerMismatch { expected: String, found: String },
    MissingAudience,
    AudienceMismatch { expected: String },
    MissingExpiration,
    Expired { expired_at: i64 },
    MissingIssuedAt,
    /// Issued longer ago than the freshness bound allows.
    Stale { age_seconds: i64 },
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIssuer => write!(f, "issuer claim missing"),
            Self::IssuerMismatch { expected, found } => {
                write!(f, "issuer '{found}' does not match '{expected}'")
            }
            Self::MissingAudience => write!(f, "audience claim missing"),
            Self::AudienceMismatch { expected } => {
                write!(f, "audience does not include '{expected}'")
            }
            Self::MissingExpiration => write!(f, "expiration claim missing"),
            Self::Expired { expired_at } => write!(f, "token expired at {expired_at}"),
            Self::MissingIssuedAt => write!(f, "issued-at claim missing"),
            Self::Stale { age_seconds } => {
                write!(f, "token issued {age_seconds}s ago is too old")
            }
        }
    }
}

impl std::error::Error for ClaimError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_display() {
        assert_eq!(SessionError::NotFound.to_string(), "session not found");
    }

    #[test]
    fn unexpected_status_display() {
        let err = OidcError::UnexpectedStatus {
            endpoint: "https://idp.example/oauth2/v1/token".to_string(),
            status: 401,
        };
        assert!(err.to_string().contains("oauth2/v1/token"));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn unsupported_token_type_display_without_typ() {
        let err = OidcError::UnsupportedTokenType {
            expected: "application/okta-internal-at+jwt".to_string(),
            found: None,
        };
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn stale_claim_display() {
        let err = ClaimError::Stale { age_seconds: 301 };
        assert!(err.to_string().contains("301s"));
    }
}
