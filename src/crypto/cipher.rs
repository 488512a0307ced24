use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::Engine as _;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::AuthError;

const NONCE_LEN: usize = 12;

/// AES-256-GCM encryption for provider tokens carried inside session tokens.
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Create a cipher from a base64-encoded 32-byte key.
    pub fn new(master_key_b64: &str) -> Result<Self, AuthError> {
        let master_key = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(master_key_b64)
                .map_err(|e| AuthError::CryptoError(format!("Invalid MASTER_KEY base64: {e}")))?,
        );

        if master_key.len() != 32 {
            return Err(AuthError::CryptoError(format!(
                "MASTER_KEY must be 32 bytes, got {}",
                master_key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&master_key)
            .map_err(|e| AuthError::CryptoError(format!("Failed to init AES cipher: {e}")))?;

        Ok(Self { cipher })
    }

    /// Encrypt plaintext. Returns base64url(nonce || ciphertext).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AuthError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AuthError::CryptoError(format!("Encryption failed: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&combined))
    }

    /// Decrypt base64url(nonce || ciphertext) back to plaintext.
    pub fn decrypt(&self, encrypted: &str) -> Result<String, AuthError> {
        let combined = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encrypted)
            .map_err(|e| AuthError::CryptoError(format!("Invalid base64: {e}")))?;

        if combined.len() < NONCE_LEN {
            return Err(AuthError::CryptoError("Ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| AuthError::CryptoError(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| AuthError::CryptoError(format!("Invalid UTF-8 after decrypt: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> TokenCipher {
        let key = base64::engine::general_purpose::STANDARD.encode([0x42u8; 32]);
        TokenCipher::new(&key).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let plaintext = "discord-access-token-12345";
        let encrypted = cipher.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_encrypt_produces_different_ciphertexts() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same-input").unwrap();
        let b = cipher.encrypt("same-input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = test_cipher().encrypt("token").unwrap();
        let other_key = base64::engine::general_purpose::STANDARD.encode([0x01u8; 32]);
        let other = TokenCipher::new(&other_key).unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_key_length_is_checked() {
        let short = base64::engine::general_purpose::STANDARD.encode([0x42u8; 16]);
        assert!(TokenCipher::new(&short).is_err());
    }
}
