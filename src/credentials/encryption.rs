//! AES-256-GCM encryption for secrets stored in the settings database.
//!
//! Every value gets its own random nonce. The nonce and the ciphertext (which
//! carries the GCM authentication tag) are packed into a single opaque string,
//! so callers only ever handle one column per secret.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Validates that the master key is exactly 32 bytes when base64 decoded.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }

    Ok(key_bytes)
}

/// Wire layout of an encrypted value before the outer base64 pass.
#[derive(Serialize, Deserialize)]
struct Envelope {
    nonce: String,
    ciphertext: String,
}

/// Symmetric encryptor holding a validated 256-bit key.
///
/// The key is checked once at construction, so a misconfigured key fails at
/// startup rather than on the first secret that needs decrypting.
#[derive(Clone)]
pub struct Encryptor {
    key: Vec<u8>,
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor").field("key", &"<redacted>").finish()
    }
}

impl Encryptor {
    /// Build an encryptor from a base64-encoded 32-byte key.
    pub fn from_base64(key_base64: &str) -> Result<Self> {
        let key = validate_key(key_base64)?;
        Ok(Self { key })
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
    }

    /// Encrypts plaintext into an opaque, storable string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        let envelope = Envelope {
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(&ciphertext),
        };
        let json = serde_json::to_vec(&envelope).context("Failed to serialize envelope")?;

        Ok(BASE64.encode(json))
    }

    /// Decrypts a value produced by [`Encryptor::encrypt`].
    ///
    /// Fails on malformed input, a different key, or a tampered ciphertext.
    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        let json = BASE64
            .decode(encrypted)
            .context("Failed to decode encrypted value")?;
        let envelope: Envelope =
            serde_json::from_slice(&json).context("Malformed encrypted value")?;

        let nonce_bytes = BASE64
            .decode(&envelope.nonce)
            .context("Failed to decode nonce")?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(anyhow!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            ));
        }
        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .context("Failed to decode ciphertext")?;

        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

        String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
    }

    /// Like [`Encryptor::encrypt`] but maps empty input and failures to `None`.
    pub fn safe_encrypt(&self, plaintext: Option<&str>) -> Option<String> {
        let plaintext = plaintext.filter(|s| !s.is_empty())?;
        match self.encrypt(plaintext) {
            Ok(encrypted) => Some(encrypted),
            Err(e) => {
                tracing::error!(error = %e, "Encryption error");
                None
            }
        }
    }

    /// Like [`Encryptor::decrypt`] but maps empty input and failures to `None`.
    pub fn safe_decrypt(&self, encrypted: Option<&str>) -> Option<String> {
        let encrypted = encrypted.filter(|s| !s.is_empty())?;
        match self.decrypt(encrypted) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                tracing::error!(error = %e, "Decryption error");
                None
            }
        }
    }
}
