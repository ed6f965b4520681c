//! Compact JWS decoding and RS256 signature verification.
//!
//! Tokens are `base64url(header).base64url(payload).base64url(signature)`,
//! unpadded. The signature covers the ASCII bytes of everything before the
//! last dot.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::JoseError;
use crate::oidc::claims::JwtClaims;

pub const ALGORITHM_RS256: &str = "RS256";
pub const KEY_TYPE_RSA: &str = "RSA";
pub const KEY_USE_SIGNING: &str = "sig";

/// Decoded first segment of a compact token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoseHeader {
    #[serde(rename = "alg")]
    pub algorithm: String,
    #[serde(rename = "typ", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(rename = "enc", default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
}

/// A published signing key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(rename = "kty")]
    pub key_type: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// RSA modulus, base64url big-endian.
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub modulus: Option<String>,
    /// RSA public exponent, base64url big-endian.
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub exponent: Option<String>,
}

impl Jwk {
    /// Whether this key may have signed a token carrying `header`.
    ///
    /// Only RSA keys qualify. `alg` and `use` are checked when the key
    /// publishes them, and key IDs only when both sides carry one.
    #[must_use]
    pub fn is_candidate_for(&self, header: &JoseHeader) -> bool {
        if self.key_type != KEY_TYPE_RSA {
            return false;
        }

        if self
            .algorithm
            .as_deref()
            .is_some_and(|alg| !alg.is_empty() && alg != ALGORITHM_RS256)
        {
            return false;
        }

        if self
            .usage
            .as_deref()
            .is_some_and(|usage| !usage.is_empty() && usage != KEY_USE_SIGNING)
        {
            return false;
        }

        match (header.key_id.as_deref(), self.key_id.as_deref()) {
            (Some(wanted), Some(have)) if !wanted.is_empty() && !have.is_empty() => wanted == have,
            _ => true,
        }
    }

    /// Reconstructs the RSA public key from the modulus and exponent.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::InvalidKey`] if either component is absent, not
    /// base64url, or does not form a valid RSA key.
    pub fn rsa_public_key(&self) -> Result<RsaPublicKey, JoseError> {
        let modulus = self
            .modulus
            .as_deref()
            .ok_or_else(|| JoseError::invalid_key("modulus missing"))?;
        let exponent = self
            .exponent
            .as_deref()
            .ok_or_else(|| JoseError::invalid_key("exponent missing"))?;

        let modulus = URL_SAFE_NO_PAD
            .decode(modulus)
            .map_err(|e| JoseError::invalid_key(format!("modulus: {e}")))?;
        let exponent = URL_SAFE_NO_PAD
            .decode(exponent)
            .map_err(|e| JoseError::invalid_key(format!("exponent: {e}")))?;

        RsaPublicKey::new(
            BigUint::from_bytes_be(&modulus),
            BigUint::from_bytes_be(&exponent),
        )
        .map_err(|e| JoseError::invalid_key(e.to_string()))
    }
}

/// A published key set. Order matters only for which key is tried first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Returns the header segment: everything before the first dot.
///
/// # Errors
///
/// Returns [`JoseError::Malformed`] if the token has no dot at all.
pub fn header_segment(token: &str) -> Result<&str, JoseError> {
    token
        .split_once('.')
        .map(|(header, _)| header)
        .ok_or_else(|| JoseError::malformed("token has no segments"))
}

/// Decodes an unpadded base64url JOSE header segment.
///
/// # Errors
///
/// Returns [`JoseError::Malformed`] if the segment is not base64url JSON.
pub fn decode_jose_header(segment: &str) -> Result<JoseHeader, JoseError> {
    let bytes = decode_segment(segment, "header")?;
    serde_json::from_slice(&bytes).map_err(|e| JoseError::malformed(format!("header: {e}")))
}

/// Verifies `token` against `key` with RS256 and returns its claims.
///
/// Claims are decoded but not validated; see
/// [`validate_claims`](crate::oidc::claims::validate_claims).
///
/// # Errors
///
/// - [`JoseError::Malformed`] when the token is not three base64url segments
///   with JSON header and payload
/// - [`JoseError::UnsupportedAlgorithm`] when the header is not RS256
/// - [`JoseError::InvalidKey`] when `key` is not a usable RSA key
/// - [`JoseError::SignatureInvalid`] when the signature does not match
pub fn decode_jwt(token: &str, key: &Jwk) -> Result<JwtClaims, JoseError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(JoseError::malformed("expected three segments"));
    };

    let jose = decode_jose_header(header)?;
    if jose.algorithm != ALGORITHM_RS256 {
        return Err(JoseError::UnsupportedAlgorithm {
            algorithm: jose.algorithm,
        });
    }

    let payload_bytes = decode_segment(payload, "payload")?;
    let signature_bytes = decode_segment(signature, "signature")?;
    let public_key = key.rsa_public_key()?;

    let signed_content = &token[..header.len() + 1 + payload.len()];
    let digest = Sha256::digest(signed_content.as_bytes());

    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature_bytes)
        .map_err(|_| JoseError::SignatureInvalid)?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|e| JoseError::malformed(format!("payload: {e}")))
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, JoseError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JoseError::malformed(format!("{name}: {e}")))
}
