//! JWT claims and their validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClaimError;

/// Oldest `iat` accepted, relative to the verification time.
pub const MAX_TOKEN_AGE_SECONDS: i64 = 5 * 60;

/// Registered claims of a verified token.
///
/// Missing string claims decode as empty and missing times as zero, so that
/// validation can report exactly which one was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    #[serde(rename = "jti", default)]
    pub id: String,
    #[serde(rename = "iss", default)]
    pub issuer: String,
    #[serde(rename = "iat", default)]
    pub issued_at: i64,
    #[serde(rename = "sub", default)]
    pub subject: String,
    #[serde(rename = "aud", default, deserialize_with = "deserialize_audience")]
    pub audience: Vec<String>,
    #[serde(rename = "exp", default)]
    pub expiration: i64,
}

/// Accepts `aud` as either a single string or an array of strings.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Audience::deserialize(deserializer)? {
        Audience::One(audience) => vec![audience],
        Audience::Many(audiences) => audiences,
    })
}

/// Values the provider is expected to have put in a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimExpectations {
    pub issuer: String,
    pub audience: String,
}

/// Checks issuer, audience, expiry and freshness of `claims` at `now`.
///
/// # Errors
///
/// Returns the first rule the claims break.
pub fn validate_claims(
    claims: &JwtClaims,
    expected: &ClaimExpectations,
    now: DateTime<Utc>,
) -> Result<(), ClaimError> {
    let now = now.timestamp();

    if claims.issuer.is_empty() {
        return Err(ClaimError::MissingIssuer);
    }
    if claims.issuer != expected.issuer {
        return Err(ClaimError::IssuerMismatch {
            expected: expected.issuer.clone(),
            found: claims.issuer.clone(),
        });
    }

    if claims.audience.iter().all(String::is_empty) {
        return Err(ClaimError::MissingAudience);
    }
    if !claims.audience.iter().any(|aud| *aud == expected.audience) {
        return Err(ClaimError::AudienceMismatch {
            expected: expected.audience.clone(),
        });
    }

    if claims.expiration == 0 {
        return Err(ClaimError::MissingExpiration);
    }
    if claims.expiration <= now {
        return Err(ClaimError::Expired {
            expired_at: claims.expiration,
        });
    }

    if claims.issued_at == 0 {
        return Err(ClaimError::MissingIssuedAt);
    }
    let age_seconds = now - claims.issued_at;
    if age_seconds > MAX_TOKEN_AGE_SECONDS {
        return Err(ClaimError::Stale { age_seconds });
    }

    Ok(())
}
