//! Pluggable record signing
//!
//! The engine never decides trust itself; it hands the canonical bytes of an
//! unsigned record to a [`Signer`] and stores whatever opaque string comes
//! back. [`Ed25519Signer`] is the bundled implementation and can persist its
//! key as an AES-256-GCM encrypted JSON file.

use std::fs;
use std::path::Path;

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonicalize::{canonicalize_json, canonicalize_unsigned};
use crate::errors::{RecordError, RecordResult};
use crate::record::UnsignedRecord;

/// Sign/verify primitives supplied by the embedding application.
pub trait Signer: Send + Sync {
    /// Sign the canonical serialization of `record`
    fn sign(&self, record: &UnsignedRecord) -> RecordResult<String>;

    /// Check `signature` against the canonical serialization of `data`.
    ///
    /// Malformed signatures should yield `Ok(false)`; an `Err` is reserved
    /// for the signer itself being unusable.
    fn verify(&self, data: &Value, signature: &str) -> RecordResult<bool>;
}

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl From<KeyError> for RecordError {
    fn from(err: KeyError) -> Self {
        RecordError::crypto(err.to_string())
    }
}

/// Encrypted key file format
#[derive(Serialize, Deserialize)]
struct EncryptedKeyFile {
    version: u32,
    encrypted_private_key_b64: String,
    public_key_b64: String,
    nonce_b64: String,
    created_at: String,
}

/// Ed25519 signer producing base64 signatures over JCS bytes
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Ed25519Signer {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Load from a base64-encoded 32-byte private key
    pub fn from_signing_key_b64(b64: &str) -> Result<Self, KeyError> {
        let sk_bytes = B64.decode(b64)?;
        let sk_array: [u8; 32] = sk_bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidKeyLength(sk_bytes.len()))?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&sk_array)))
    }

    pub fn public_key_b64(&self) -> String {
        B64.encode(self.verifying_key.to_bytes())
    }

    /// Write the key pair to `path`, private half sealed with `encryption_key`
    pub fn save_encrypted<P: AsRef<Path>>(
        &self,
        path: P,
        encryption_key: &[u8; 32],
    ) -> Result<(), KeyError> {
        let mut nonce_bytes = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(encryption_key)
            .map_err(|e| KeyError::Encryption(e.to_string()))?;
        let private_key_bytes = self.signing_key.to_bytes();
        let encrypted = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), &private_key_bytes[..])
            .map_err(|e| KeyError::Encryption(e.to_string()))?;

        let file = EncryptedKeyFile {
            version: 1,
            encrypted_private_key_b64: B64.encode(&encrypted),
            public_key_b64: self.public_key_b64(),
            nonce_b64: B64.encode(nonce_bytes),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Load a key pair written by [`Ed25519Signer::save_encrypted`]
    pub fn load_encrypted<P: AsRef<Path>>(
        path: P,
        encryption_key: &[u8; 32],
    ) -> Result<Self, KeyError> {
        let content = fs::read_to_string(path)?;
        let file: EncryptedKeyFile = serde_json::from_str(&content)?;

        let cipher = Aes256Gcm::new_from_slice(encryption_key)
            .map_err(|e| KeyError::Encryption(e.to_string()))?;
        let nonce_bytes = B64.decode(&file.nonce_b64)?;
        if nonce_bytes.len() != 12 {
            return Err(KeyError::Encryption("invalid nonce length".to_string()));
        }
        let encrypted = B64.decode(&file.encrypted_private_key_b64)?;

        let private_key_bytes = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), &encrypted[..])
            .map_err(|e| KeyError::Encryption(e.to_string()))?;
        let key_len = private_key_bytes.len();
        let sk_array: [u8; 32] = private_key_bytes
            .try_into()
            .map_err(|_| KeyError::InvalidKeyLength(key_len))?;

        let signer = Self::from_signing_key(SigningKey::from_bytes(&sk_array));
        if signer.public_key_b64() != file.public_key_b64 {
            return Err(KeyError::Encryption("Public key mismatch".to_string()));
        }
        Ok(signer)
    }

    fn sign_bytes(&self, bytes: &[u8]) -> String {
        B64.encode(self.signing_key.sign(bytes).to_bytes())
    }

    fn verify_bytes(&self, bytes: &[u8], signature_b64: &str) -> bool {
        let Ok(sig_bytes) = B64.decode(signature_b64) else {
            return false;
        };
        let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        self.verifying_key
            .verify(bytes, &Signature::from_bytes(&sig_array))
            .is_ok()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, record: &UnsignedRecord) -> RecordResult<String> {
        let canonical = canonicalize_unsigned(record)?;
        Ok(self.sign_bytes(canonical.as_bytes()))
    }

    fn verify(&self, data: &Value, signature: &str) -> RecordResult<bool> {
        let canonical = canonicalize_json(data)?;
        Ok(self.verify_bytes(canonical.as_bytes(), signature))
    }
}

/// Decode a base64 32-byte symmetric key
pub fn decode_key_b64(encoded: &str) -> RecordResult<[u8; 32]> {
    let decoded = B64
        .decode(encoded.trim())
        .map_err(|e| RecordError::config(format!("invalid base64 key: {e}")))?;
    <[u8; 32]>::try_from(decoded.as_slice())
        .map_err(|_| RecordError::config(format!("key must be 32 bytes, got {}", decoded.len())))
}
