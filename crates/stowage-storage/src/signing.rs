//! HMAC-SHA256 signing of issued object URLs.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use stowage_core::error::AppError;
use stowage_core::result::AppResult;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies the canonical string of an object URL.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    /// Create a signer. The secret must not be empty.
    pub fn new(secret: &str) -> AppResult<Self> {
        if secret.is_empty() {
            return Err(AppError::configuration(
                "object_store.local.signing_secret must be set",
            ));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    fn mac(&self, parts: &[&str]) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::internal(format!("Invalid signing key: {e}")))?;
        mac.update(parts.join("\n").as_bytes());
        Ok(mac)
    }

    /// Base64url signature over the newline-joined parts.
    pub fn sign(&self, parts: &[&str]) -> AppResult<String> {
        let tag = self.mac(parts)?.finalize().into_bytes();
        Ok(URL_SAFE_NO_PAD.encode(tag))
    }

    /// Constant-time check of a base64url signature.
    pub fn verify(&self, parts: &[&str], signature: &str) -> bool {
        let Ok(expected) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        match self.mac(parts) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let signer = UrlSigner::new("secret").unwrap();
        let sig = signer.sign(&["PUT", "abc.txt", "100"]).unwrap();
        assert!(signer.verify(&["PUT", "abc.txt", "100"], &sig));
        assert!(!signer.verify(&["PUT", "abc.txt", "101"], &sig));
        assert!(!signer.verify(&["PUT", "abc.txt", "100"], "not-base64!"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(UrlSigner::new("").is_err());
    }
}
