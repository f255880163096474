//! Credential vault: symmetric authenticated encryption of OAuth tokens at rest.
//!
//! Ciphertext is a printable envelope `v1:<nonce>:<payload>` (URL-safe base64,
//! no padding) so it can live in a text column. Key material is process-wide
//! configuration loaded once at startup; no runtime rotation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, AeadCore, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use thiserror::Error;

const ENVELOPE_VERSION: &str = "v1";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("vault key must be a base64-encoded 32-byte value")]
    InvalidKey,
    #[error("ciphertext envelope is malformed")]
    InvalidEnvelope,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed: ciphertext rejected")]
    Decrypt,
    #[error("decrypted token is not valid utf-8")]
    NotUtf8,
}

/// Process-wide cipher for token columns. Cheap to clone behind an `Arc`.
pub struct CredentialVault {
    key: [u8; KEY_LEN],
}

impl CredentialVault {
    /// Build from the configured base64 key. Fails deterministically on
    /// anything that does not decode to exactly 32 bytes.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim().trim_end_matches('='))
            .map_err(|_| CryptoError::InvalidKey)?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let aead =
            ChaCha20Poly1305::new_from_slice(&self.key).map_err(|_| CryptoError::InvalidKey)?;
        let ciphertext = aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let nonce_b64 = URL_SAFE_NO_PAD.encode(nonce);
        let payload_b64 = URL_SAFE_NO_PAD.encode(ciphertext);
        Ok(format!("{ENVELOPE_VERSION}:{nonce_b64}:{payload_b64}"))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let mut parts = stored.split(':');
        let version = parts.next().unwrap_or_default();
        let nonce_b64 = parts.next().unwrap_or_default();
        let payload_b64 = parts.next().unwrap_or_default();
        if version != ENVELOPE_VERSION || parts.next().is_some() {
            return Err(CryptoError::InvalidEnvelope);
        }

        let nonce_raw = URL_SAFE_NO_PAD
            .decode(nonce_b64.as_bytes())
            .map_err(|_| CryptoError::InvalidEnvelope)?;
        if nonce_raw.len() != NONCE_LEN {
            return Err(CryptoError::InvalidEnvelope);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(payload_b64.as_bytes())
            .map_err(|_| CryptoError::InvalidEnvelope)?;

        let aead =
            ChaCha20Poly1305::new_from_slice(&self.key).map_err(|_| CryptoError::InvalidKey)?;
        let plaintext = aead
            .decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref())
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::NotUtf8)
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug output.
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}
