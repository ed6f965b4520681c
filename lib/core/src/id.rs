//! Opaque session identifiers.
//!
//! Session IDs are 256 bits drawn from the operating system's CSPRNG and
//! rendered as unpadded base64url, which keeps them safe to place in a cookie
//! or URL without further escaping.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of random bytes behind every session ID.
const ID_BYTES: usize = 32;

/// Length of the encoded form of [`ID_BYTES`] random bytes.
const ENCODED_LEN: usize = 43;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Identifier of a visitor session.
///
/// The `Debug` representation never includes the value, since anyone holding
/// it can act as the session.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh, unpredictable session ID.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionId(..)")
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ParseIdError;

    /// Accepts only values shaped like a generated ID, so arbitrary cookie
    /// contents never reach a session store.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ENCODED_LEN {
            return Err(ParseIdError {
                id_type: "SessionId",
                reason: format!("expected {ENCODED_LEN} characters, found {}", s.len()),
            });
        }

        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(ParseIdError {
                id_type: "SessionId",
                reason: "contains characters outside the base64url alphabet".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}
