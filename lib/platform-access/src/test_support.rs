//! RSA token signing for tests.
//!
//! Produces compact RS256 tokens and the matching JWK so verification can be
//! exercised end to end without a real identity provider.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::oidc::jose::{ALGORITHM_RS256, Jwk, Jwks, KEY_TYPE_RSA, KEY_USE_SIGNING};

static SHARED: LazyLock<TokenSigner> = LazyLock::new(|| TokenSigner::generate("test-key"));

/// An RSA key pair that signs tokens under a fixed key ID.
pub struct TokenSigner {
    key: RsaPrivateKey,
    key_id: String,
}

impl TokenSigner {
    /// Generates a fresh 2048-bit key.
    ///
    /// # Panics
    ///
    /// Panics if key generation fails.
    #[must_use]
    pub fn generate(key_id: &str) -> Self {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate RSA key");
        Self {
            key,
            key_id: key_id.to_string(),
        }
    }

    /// A process-wide signer, generated on first use.
    #[must_use]
    pub fn shared() -> &'static Self {
        &SHARED
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The public half as a JWK with `kty`, `alg`, `use` and `kid` set.
    #[must_use]
    pub fn jwk(&self) -> Jwk {
        let public = self.key.to_public_key();
        Jwk {
            key_type: KEY_TYPE_RSA.to_string(),
            usage: Some(KEY_USE_SIGNING.to_string()),
            algorithm: Some(ALGORITHM_RS256.to_string()),
            key_id: Some(self.key_id.clone()),
            modulus: Some(URL_SAFE_NO_PAD.encode(public.n().to_bytes_be())),
            exponent: Some(URL_SAFE_NO_PAD.encode(public.e().to_bytes_be())),
        }
    }

    /// A key set holding only this signer's key.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.jwk()],
        }
    }

    /// Signs `claims` under a standard `{"alg":"RS256","typ":"JWT","kid":..}` header.
    #[must_use]
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        self.sign_with_header(
            &serde_json::json!({
                "alg": ALGORITHM_RS256,
                "typ": "JWT",
                "kid": self.key_id,
            }),
            claims,
        )
    }

    /// Signs `claims` under an arbitrary header.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    #[must_use]
    pub fn sign_with_header(
        &self,
        header: &serde_json::Value,
        claims: &serde_json::Value,
    ) -> String {
        let header = URL_SAFE_NO_PAD.encode(header.to_string());
        let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signed_content = format!("{header}.{claims}");

        let digest = Sha256::digest(signed_content.as_bytes());
        let signature = self
            .key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .expect("sign token");

        format!("{signed_content}.{}", URL_SAFE_NO_PAD.encode(signature))
    }
}
