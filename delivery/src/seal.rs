//! AES-256-GCM sealing of envelope payloads.
//!
//! Each user gets a distinct key derived from the configured master key with
//! HMAC-SHA256 over the user id. The nonce is prepended to the ciphertext and
//! the result is base64-encoded so it can travel inside a JSON envelope.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use thiserror::Error;

use crate::message::{Envelope, Payload};

/// 12-byte nonce size for AES-GCM
const NONCE_SIZE: usize = 12;

const KEY_SIZE: usize = 32;

/// Errors that can occur while sealing or opening payloads
#[derive(Debug, Error)]
pub enum SealError {
    #[error("Invalid master key: must be 32 bytes (64 hex characters)")]
    InvalidKey,

    #[error("Failed to decode hex key: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Failed to decode base64 ciphertext: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Failed to encode or decode payload JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sealing failed")]
    SealFailed,

    #[error("Opening failed - data may be corrupted or sealed for another user")]
    OpenFailed,

    #[error("Ciphertext too short - missing nonce")]
    CiphertextTooShort,
}

type HmacSha256 = Hmac<Sha256>;

/// Seals and opens payloads for a given user.
#[derive(Clone)]
pub struct Sealer {
    master_key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer").finish_non_exhaustive()
    }
}

impl Sealer {
    pub fn new(master_key: [u8; KEY_SIZE]) -> Self {
        Self { master_key }
    }

    /// Build a sealer from a hex-encoded 32-byte master key.
    pub fn from_hex(key_hex: &str) -> Result<Self, SealError> {
        let bytes = hex::decode(key_hex)?;
        if bytes.len() != KEY_SIZE {
            return Err(SealError::InvalidKey);
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self::new(key))
    }

    fn user_cipher(&self, user_id: &str) -> Result<Aes256Gcm, SealError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.master_key)
            .map_err(|_| SealError::InvalidKey)?;
        mac.update(user_id.as_bytes());
        let key = mac.finalize().into_bytes();
        Aes256Gcm::new_from_slice(&key).map_err(|_| SealError::InvalidKey)
    }

    /// Encrypt `plaintext` for `user_id`. Output is base64(nonce || ciphertext).
    pub fn seal_bytes(&self, user_id: &str, plaintext: &[u8]) -> Result<String, SealError> {
        let cipher = self.user_cipher(user_id)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| SealError::SealFailed)?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypt output of [`Sealer::seal_bytes`] for the same user.
    pub fn open_bytes(&self, user_id: &str, sealed_b64: &str) -> Result<Vec<u8>, SealError> {
        let cipher = self.user_cipher(user_id)?;
        let combined = BASE64.decode(sealed_b64)?;

        if combined.len() < NONCE_SIZE {
            return Err(SealError::CiphertextTooShort);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SealError::OpenFailed)
    }

    /// Replace a plaintext payload with its sealed form for the envelope's
    /// target. Already-sealed payloads are returned untouched.
    pub fn seal(&self, mut envelope: Envelope) -> Result<Envelope, SealError> {
        if let Payload::Plain { data } = &envelope.payload {
            let plaintext = serde_json::to_vec(data)?;
            let ciphertext = self.seal_bytes(&envelope.target_user_id, &plaintext)?;
            envelope.payload = Payload::Sealed { ciphertext };
        }
        Ok(envelope)
    }

    /// Inverse of [`Sealer::seal`]. Plaintext payloads are returned untouched.
    pub fn open(&self, mut envelope: Envelope) -> Result<Envelope, SealError> {
        if let Payload::Sealed { ciphertext } = &envelope.payload {
            let plaintext = self.open_bytes(&envelope.target_user_id, ciphertext)?;
            let data = serde_json::from_slice(&plaintext)?;
            envelope.payload = Payload::Plain { data };
        }
        Ok(envelope)
    }
}
