//! Access token verification against a published key set.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::OidcError;
use crate::oidc::claims::{ClaimExpectations, JwtClaims, validate_claims};
use crate::oidc::jose::{JoseHeader, Jwks, decode_jwt};

/// Requires the header's `typ` to equal `expected`, when one is configured.
///
/// OIDC leaves access token `typ` unstandardised, so providers that use a
/// private value (Okta's `application/okta-internal-at+jwt`) must be matched
/// exactly, and providers that do not are not checked.
///
/// # Errors
///
/// Returns [`OidcError::UnsupportedTokenType`] on mismatch.
pub fn check_token_type(header: &JoseHeader, expected: Option<&str>) -> Result<(), OidcError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    if header.token_type.as_deref() == Some(expected) {
        Ok(())
    } else {
        Err(OidcError::UnsupportedTokenType {
            expected: expected.to_string(),
            found: header.token_type.clone(),
        })
    }
}

/// Verifies `token` with the first key in `keys` that both signed it and
/// yields acceptable claims.
///
/// Keys are tried in published order, skipping those that cannot match
/// `header`. A bad signature or rejected claim moves on to the next key.
///
/// # Errors
///
/// Returns [`OidcError::Unverified`] once every candidate has been tried.
pub fn verify_access_token(
    token: &str,
    header: &JoseHeader,
    keys: &Jwks,
    expected: &ClaimExpectations,
    now: DateTime<Utc>,
) -> Result<JwtClaims, OidcError> {
    let mut candidates = 0;

    for key in keys.keys.iter().filter(|key| key.is_candidate_for(header)) {
        candidates += 1;
        let key_id = key.key_id.as_deref().unwrap_or_default();

        let claims = match decode_jwt(token, key) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(key_id, error = %e, "key did not verify token");
                continue;
            }
        };

        match validate_claims(&claims, expected, now) {
            Ok(()) => {
                debug!(key_id, "verified access token");
                return Ok(claims);
            }
            Err(e) => debug!(key_id, error = %e, "verified token has invalid claims"),
        }
    }

    warn!(candidates, "no signing key verified the access token");
    Err(OidcError::Unverified { candidates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::jose::{Jwk, decode_jose_header, header_segment};
    use crate::test_support::TokenSigner;
    use chrono::Duration;
    use serde_json::json;

    const ISSUER: &str = "https://dev-123.okta.com";

    fn expectations() -> ClaimExpectations {
        ClaimExpectations {
            issuer: ISSUER.to_string(),
            audience: ISSUER.to_string(),
        }
    }

    fn claims(now: DateTime<Utc>) -> serde_json::Value {
        json!({
            "jti": "AT.1",
            "iss": ISSUER,
            "aud": ISSUER,
            "sub": "00u1",
            "iat": now.timestamp(),
            "exp": (now + Duration::hours(1)).timestamp(),
        })
    }

    fn header_of(token: &str) -> JoseHeader {
        decode_jose_header(header_segment(token).expect("segment")).expect("header")
    }

    #[test]
    fn verifies_with_matching_key() {
        let now = Utc::now();
        let signer = TokenSigner::shared();
        let token = signer.sign(&claims(now));

        let verified =
            verify_access_token(&token, &header_of(&token), &signer.jwks(), &expectations(), now)
                .expect("verified");
        assert_eq!(verified.subject, "00u1");
    }

    #[test]
    fn continues_past_keys_that_fail() {
        let now = Utc::now();
        let signer = TokenSigner::shared();
        let token = signer.sign_with_header(&json!({"alg": "RS256", "typ": "JWT"}), &claims(now));

        let stranger = TokenSigner::generate("stranger");
        let keys = Jwks {
            keys: vec![stranger.jwk(), signer.jwk()],
        };

        let verified =
            verify_access_token(&token, &header_of(&token), &keys, &expectations(), now);
        assert!(verified.is_ok());
    }

    #[test]
    fn skips_ineligible_keys() {
        let now = Utc::now();
        let signer = TokenSigner::shared();
        let token = signer.sign(&claims(now));

        let mut wrong_kid = signer.jwk();
        wrong_kid.key_id = Some("rotated-out".to_string());
        let mut encryption_key = signer.jwk();
        encryption_key.usage = Some("enc".to_string());
        let elliptic = Jwk {
            key_type: "EC".to_string(),
            ..Jwk::default()
        };

        let keys = Jwks {
            keys: vec![wrong_kid, encryption_key, elliptic],
        };

        assert_eq!(
            verify_access_token(&token, &header_of(&token), &keys, &expectations(), now),
            Err(OidcError::Unverified { candidates: 0 })
        );
    }

    #[test]
    fn tampered_signature_exhausts_keys() {
        let now = Utc::now();
        let signer = TokenSigner::shared();
        let token = signer.sign(&claims(now));
        let mut bytes = token.into_bytes();
        // Well inside the signature segment, clear of its final partial sextet.
        let index = bytes.len() - 10;
        bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).expect("ascii");

        assert_eq!(
            verify_access_token(
                &tampered,
                &header_of(&tampered),
                &signer.jwks(),
                &expectations(),
                now
            ),
            Err(OidcError::Unverified { candidates: 1 })
        );
    }

    #[test]
    fn rejected_claims_exhaust_keys() {
        let now = Utc::now();
        let signer = TokenSigner::shared();

        let mut expired = claims(now);
        expired["exp"] = json!((now - Duration::seconds(1)).timestamp());
        let token = signer.sign(&expired);
        assert!(
            verify_access_token(&token, &header_of(&token), &signer.jwks(), &expectations(), now)
                .is_err()
        );

        let mut stale = claims(now);
        stale["iat"] = json!((now - Duration::minutes(6)).timestamp());
        let token = signer.sign(&stale);
        assert!(
            verify_access_token(&token, &header_of(&token), &signer.jwks(), &expectations(), now)
                .is_err()
        );

        let mut foreign = claims(now);
        foreign["iss"] = json!("https://evil.example");
        let token = signer.sign(&foreign);
        assert!(
            verify_access_token(&token, &header_of(&token), &signer.jwks(), &expectations(), now)
                .is_err()
        );
    }

    #[test]
    fn token_type_check() {
        let okta = JoseHeader {
            algorithm: "RS256".to_string(),
            token_type: Some("application/okta-internal-at+jwt".to_string()),
            ..JoseHeader::default()
        };
        let plain = JoseHeader {
            token_type: Some("JWT".to_string()),
            ..okta.clone()
        };

        assert!(check_token_type(&okta, Some("application/okta-internal-at+jwt")).is_ok());
        assert!(check_token_type(&plain, None).is_ok());
        assert_eq!(
            check_token_type(&plain, Some("application/okta-internal-at+jwt")),
            Err(OidcError::UnsupportedTokenType {
                expected: "application/okta-internal-at+jwt".to_string(),
                found: Some("JWT".to_string()),
            })
        );
    }
}
