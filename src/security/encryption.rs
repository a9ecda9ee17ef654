/// AES-256-GCM encryption for secrets at rest.
///
/// Wire layout: `[nonce (12 bytes)][ciphertext][tag (16 bytes)]`, with a
/// fresh random nonce per call so encrypting the same plaintext twice
/// never yields the same bytes. Decryption verifies the authentication tag
/// and fails closed on any mismatch.
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as base64_engine, Engine as _};
use rand::Rng;
use zeroize::Zeroizing;

use crate::error::{AuthError, Result};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// Build from a base64-encoded 256-bit key.
    pub fn new(key_base64: &str) -> Result<Self> {
        let key_bytes = Zeroizing::new(
            base64_engine
                .decode(key_base64)
                .map_err(|e| AuthError::Encryption(format!("key is not valid base64: {e}")))?,
        );
        if key_bytes.len() != 32 {
            return Err(AuthError::Encryption(format!(
                "key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::thread_rng().gen();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload::from(plaintext))
            .map_err(|e| AuthError::Encryption(format!("AES-GCM failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(AuthError::DecryptionFailed);
        }

        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
        let plaintext = self
            .cipher
            .decrypt(nonce, Payload::from(&data[NONCE_LEN..]))
            .map_err(|_| AuthError::DecryptionFailed)?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Encrypt to a base64 string, the form stored in a text column.
    pub fn encrypt_to_string(&self, plaintext: &[u8]) -> Result<String> {
        Ok(base64_engine.encode(self.encrypt(plaintext)?))
    }

    /// Counterpart of [`encrypt_to_string`](Self::encrypt_to_string).
    pub fn decrypt_from_string(&self, encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
        let data = base64_engine
            .decode(encoded)
            .map_err(|_| AuthError::DecryptionFailed)?;
        self.decrypt(&data)
    }
}

/// Generate a random 256-bit key encoded in base64, for operators setting
/// up a new deployment.
pub fn generate_encryption_key() -> String {
    let key_bytes: [u8; 32] = rand::thread_rng().gen();
    base64_engine.encode(key_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> EncryptionService {
        EncryptionService::new(&generate_encryption_key()).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let service = service();
        let encrypted = service.encrypt(b"mfa seed material").unwrap();
        let decrypted = service.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted.as_slice(), b"mfa seed material");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let service = service();
        let a = service.encrypt(b"same").unwrap();
        let b = service.encrypt(b"same").unwrap();
        assert_ne!(a, b);
        assert_eq!(service.decrypt(&a).unwrap().as_slice(), b"same");
        assert_eq!(service.decrypt(&b).unwrap().as_slice(), b"same");
    }

    #[test]
    fn test_tampered_ciphertext_fails_closed() {
        let service = service();
        let mut encrypted = service.encrypt(b"secret").unwrap();
        encrypted[NONCE_LEN + 1] ^= 0xFF;
        assert!(matches!(
            service.decrypt(&encrypted),
            Err(AuthError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_truncated_input_fails_closed() {
        let service = service();
        assert!(matches!(
            service.decrypt(b"short"),
            Err(AuthError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let encrypted = service().encrypt(b"secret").unwrap();
        let other = service();
        assert!(matches!(
            other.decrypt(&encrypted),
            Err(AuthError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_string_form_roundtrip() {
        let service = service();
        let encoded = service.encrypt_to_string(b"seed").unwrap();
        let decrypted = service.decrypt_from_string(&encoded).unwrap();
        assert_eq!(decrypted.as_slice(), b"seed");
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(EncryptionService::new("not base64").is_err());
        assert!(EncryptionService::new(&base64_engine.encode(b"short")).is_err());
    }
}
