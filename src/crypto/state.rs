use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const MAC_LEN: usize = 32;

/// OAuth `state` parameters older than this are refused.
pub const STATE_MAX_AGE_SECS: i64 = 10 * 60;

fn new_hmac(key: &[u8]) -> Result<HmacSha256, AuthError> {
    <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| AuthError::CryptoError(format!("HMAC init failed: {e}")))
}

/// Signs and verifies the OAuth `state` round-trip parameter.
///
/// Wire format: `base64url(hmac || payload)` where payload is
/// `<hex nonce>:<unix timestamp>`.
pub struct StateSigner {
    hmac_key: Vec<u8>,
}

impl StateSigner {
    /// Create a signer from a base64-encoded key.
    pub fn new(hmac_secret_b64: &str) -> Result<Self, AuthError> {
        let hmac_key = base64::engine::general_purpose::STANDARD
            .decode(hmac_secret_b64)
            .map_err(|e| AuthError::CryptoError(format!("Invalid HMAC_SECRET base64: {e}")))?;

        if hmac_key.len() < 16 {
            return Err(AuthError::CryptoError(format!(
                "HMAC_SECRET must be at least 16 bytes, got {}",
                hmac_key.len()
            )));
        }

        Ok(Self { hmac_key })
    }

    /// Sign an arbitrary payload. Returns base64url(hmac || payload).
    pub fn sign(&self, payload: &str) -> Result<String, AuthError> {
        let mut mac = new_hmac(&self.hmac_key)?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        let mut combined = signature.to_vec();
        combined.extend_from_slice(payload.as_bytes());

        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&combined))
    }

    /// Verify and extract a signed payload.
    pub fn verify(&self, signed: &str) -> Result<String, AuthError> {
        let combined = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signed)
            .map_err(|_| AuthError::InvalidState)?;

        if combined.len() < MAC_LEN {
            return Err(AuthError::InvalidState);
        }

        let (signature, payload_bytes) = combined.split_at(MAC_LEN);

        let mut mac = new_hmac(&self.hmac_key)?;
        mac.update(payload_bytes);
        mac.verify_slice(signature)
            .map_err(|_| AuthError::InvalidState)?;

        String::from_utf8(payload_bytes.to_vec()).map_err(|_| AuthError::InvalidState)
    }

    /// Mint a fresh state parameter for an OAuth redirect issued at `now`.
    pub fn issue_state(&self, now: i64) -> Result<String, AuthError> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.sign(&format!("{}:{now}", hex::encode(nonce)))
    }

    /// Check a state parameter returned on an OAuth callback at `now`.
    pub fn check_state(&self, signed: &str, now: i64) -> Result<(), AuthError> {
        let payload = self.verify(signed)?;
        let (_nonce, issued_at) = payload.rsplit_once(':').ok_or(AuthError::InvalidState)?;
        let issued_at: i64 = issued_at.parse().map_err(|_| AuthError::InvalidState)?;

        if now - issued_at > STATE_MAX_AGE_SECS || issued_at - now > 60 {
            return Err(AuthError::InvalidState);
        }

        Ok(())
    }
}
