//! Node private key envelope.
//!
//! Private keys are stored as `base64(nonce || ciphertext)` where the ciphertext is
//! AES-256-GCM under an operator-managed key. The operator key is loaded once, at pool
//! construction, from `HOSTER_NODE_KEY` (base64) or `HOSTER_NODE_KEY_FILE`.

use std::fs;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;
const KEY_AAD: &[u8] = b"hoster-node-key-v1";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("missing node key (set HOSTER_NODE_KEY or HOSTER_NODE_KEY_FILE)")]
    Missing,
    #[error("invalid node key encoding")]
    InvalidKey,
    #[error("failed to read node key file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("encrypted private key is not valid base64 or is truncated")]
    Encoding,
    #[error("private key decryption failed")]
    DecryptFailed,
    #[error("private key encryption failed")]
    EncryptFailed,
}

/// Decrypted private key material. Zeroed on drop.
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey(<{} bytes redacted>)", self.0.len())
    }
}

/// Decrypts node private keys with the operator key.
#[derive(Clone)]
pub struct KeyDecryptor {
    id: String,
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for KeyDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDecryptor").field("id", &self.id).finish()
    }
}

impl KeyDecryptor {
    pub fn new(key: &[u8; KEY_BYTES]) -> Result<Self, KeyError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| KeyError::InvalidKey)?;
        Ok(Self {
            id: key_id_for_bytes(key),
            cipher,
        })
    }

    /// Build from a base64-encoded 32-byte key.
    pub fn from_base64(raw: &str) -> Result<Self, KeyError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|_| KeyError::InvalidKey)?;
        let key: [u8; KEY_BYTES] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidKey)?;
        Self::new(&key)
    }

    /// Load from `HOSTER_NODE_KEY`, falling back to the file named by `HOSTER_NODE_KEY_FILE`.
    pub fn from_env() -> Result<Self, KeyError> {
        if let Ok(raw) = std::env::var("HOSTER_NODE_KEY") {
            return Self::from_base64(&raw);
        }

        if let Ok(path) = std::env::var("HOSTER_NODE_KEY_FILE") {
            let contents = fs::read_to_string(&path).map_err(|source| KeyError::Read {
                path: path.clone(),
                source,
            })?;
            return Self::from_base64(&contents);
        }

        Err(KeyError::Missing)
    }

    /// Short fingerprint of the operator key, safe to log.
    pub fn key_id(&self) -> &str {
        &self.id
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, KeyError> {
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: KEY_AAD,
                },
            )
            .map_err(|_| KeyError::EncryptFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<PrivateKey, KeyError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(sealed.trim())
            .map_err(|_| KeyError::Encoding)?;
        if bytes.len() <= NONCE_BYTES {
            return Err(KeyError::Encoding);
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_BYTES);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: KEY_AAD,
                },
            )
            .map_err(|_| KeyError::DecryptFailed)?;

        Ok(PrivateKey(plaintext))
    }
}

fn key_id_for_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)[..8].to_string()
}
