//! AES-256-GCM authenticated encryption and the self-describing blob format.
//!
//! Each call to `encrypt` generates a fresh random 12-byte nonce.
//! Every blob leads with a one-byte format tag so the reader knows which
//! scheme produced it.
//!
//! Layout of a symmetric blob:
//!   [ tag = 1 | 12-byte nonce | ciphertext + 16-byte auth tag ]

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroize;

use super::keys::{KeyHandle, RawKey};
use crate::errors::{Result, VaultCoreError};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Leading format tag carried by every encrypted blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlobVersion {
    /// Symmetric AES-256-GCM under a vault key.
    Symmetric = 1,
    /// RSA-OAEP envelope written by older clients.
    LegacyAsymmetric = 2,
    /// ML-KEM-768 + RSA-OAEP hybrid envelope.
    Hybrid = 3,
}

impl BlobVersion {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Symmetric),
            2 => Some(Self::LegacyAsymmetric),
            3 => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Build a one-off cipher from transient key bytes.
pub(crate) fn cipher_for(key: &RawKey) -> Result<Aes256Gcm> {
    <Aes256Gcm as aes_gcm::KeyInit>::new_from_slice(key.as_bytes())
        .map_err(|e| VaultCoreError::EncryptionFailed(format!("invalid key length: {e}")))
}

/// Encrypt with a fresh nonce. Returns `nonce || ciphertext`.
pub(crate) fn seal(cipher: &Aes256Gcm, plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| VaultCoreError::EncryptionFailed(format!("encryption error: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Reverse `seal`. Any failure is reported as `DecryptionFailed`.
pub(crate) fn open(cipher: &Aes256Gcm, nonce_and_ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce_and_ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultCoreError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = nonce_and_ciphertext.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultCoreError::DecryptionFailed)
}

/// Encrypt `plaintext` under `key` into a tagged symmetric blob.
pub fn encrypt(key: &KeyHandle, plaintext: &[u8]) -> Result<Vec<u8>> {
    let sealed = seal(key.cipher(), plaintext)?;

    let mut output = Vec::with_capacity(1 + sealed.len());
    output.push(BlobVersion::Symmetric.tag());
    output.extend_from_slice(&sealed);
    Ok(output)
}

/// Decrypt a blob produced by `encrypt`.
///
/// Wrong key, wrong tag, truncation and tampering all fail the same way.
pub fn decrypt(key: &KeyHandle, blob: &[u8]) -> Result<Vec<u8>> {
    match blob.split_first() {
        Some((&tag, rest)) if tag == BlobVersion::Symmetric.tag() => open(key.cipher(), rest),
        _ => Err(VaultCoreError::DecryptionFailed),
    }
}

/// Encrypt a string into base64 blob text suitable for storage.
pub fn encrypt_string(key: &KeyHandle, plaintext: &str) -> Result<String> {
    let blob = encrypt(key, plaintext.as_bytes())?;
    Ok(BASE64.encode(blob))
}

/// Decrypt base64 blob text produced by `encrypt_string`.
pub fn decrypt_string(key: &KeyHandle, blob: &str) -> Result<String> {
    let raw = BASE64
        .decode(blob)
        .map_err(|_| VaultCoreError::DecryptionFailed)?;
    let plaintext = decrypt(key, &raw)?;

    String::from_utf8(plaintext).map_err(|e| {
        let mut bad_bytes = e.into_bytes();
        bad_bytes.zeroize();
        VaultCoreError::DecryptionFailed
    })
}
