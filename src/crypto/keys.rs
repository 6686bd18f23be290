//! Key material types.
//!
//! - `RawKey` holds 32 transient key bytes and zeroes them on drop.
//! - `KeyHandle` is the opaque, non-extractable form every cipher in this
//!   crate consumes. It carries a keyed AES-256-GCM instance, a keyed
//!   HMAC-SHA256 instance (HKDF sub-key) and the key's verifier. There is
//!   no way to read the key bytes back out of it.
//! - `VerificationHash` is a one-way commitment to a key.

use std::fmt;

use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{Result, VaultCoreError};

/// Length of every symmetric key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

const MAC_INFO: &[u8] = b"zkvault-mac-key-v1";
const VERIFIER_INFO: &[u8] = b"zkvault-key-verifier-v1";

/// 32 raw key bytes, zeroed when dropped (including during unwinding).
pub struct RawKey(Zeroizing<[u8; KEY_LEN]>);

impl RawKey {
    /// Take ownership of `bytes`. The by-value argument is wiped after the copy.
    pub fn from_bytes(mut bytes: [u8; KEY_LEN]) -> Self {
        let key = Self(Zeroizing::new(bytes));
        bytes.zeroize();
        key
    }

    /// Copy exactly `KEY_LEN` bytes out of `slice`.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != KEY_LEN {
            return Err(VaultCoreError::InvalidFormat(format!(
                "key must be {KEY_LEN} bytes, got {}",
                slice.len()
            )));
        }
        let mut key = Self::zeroed();
        key.0.copy_from_slice(slice);
        Ok(key)
    }

    /// A fresh random key.
    pub fn generate() -> Self {
        let mut key = Self::zeroed();
        rand::rngs::OsRng.fill_bytes(key.as_mut_bytes());
        key
    }

    pub(crate) fn zeroed() -> Self {
        Self(Zeroizing::new([0u8; KEY_LEN]))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8; KEY_LEN] {
        &mut self.0
    }
}

impl fmt::Debug for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawKey(<redacted>)")
    }
}

/// One-way commitment to a key, stored as base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationHash(String);

impl VerificationHash {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque, non-extractable symmetric key.
#[derive(Clone)]
pub struct KeyHandle {
    cipher: Aes256Gcm,
    mac: Hmac<Sha256>,
    verifier: [u8; 32],
}

impl KeyHandle {
    /// Import raw bytes. The caller keeps ownership of (and wipes) `raw`.
    pub(crate) fn from_raw(raw: &RawKey) -> Result<Self> {
        let cipher = <Aes256Gcm as aes_gcm::KeyInit>::new_from_slice(raw.as_bytes())
            .map_err(|e| VaultCoreError::KeyDerivationFailed(format!("invalid key length: {e}")))?;

        let mac_key = hkdf_expand(raw.as_bytes(), None, MAC_INFO)?;
        let mac = <Hmac<Sha256> as Mac>::new_from_slice(mac_key.as_bytes())
            .map_err(|e| VaultCoreError::KeyDerivationFailed(format!("HMAC init failed: {e}")))?;

        let verifier_key = hkdf_expand(raw.as_bytes(), None, VERIFIER_INFO)?;
        let verifier: [u8; 32] = Sha256::digest(verifier_key.as_bytes()).into();

        Ok(Self {
            cipher,
            mac,
            verifier,
        })
    }

    pub(crate) fn cipher(&self) -> &Aes256Gcm {
        &self.cipher
    }

    /// A fresh MAC instance keyed with this handle's MAC sub-key.
    pub(crate) fn mac(&self) -> Hmac<Sha256> {
        self.mac.clone()
    }

    pub fn verifier(&self) -> VerificationHash {
        VerificationHash(BASE64.encode(self.verifier))
    }

    /// Constant-time comparison against a stored verifier.
    pub fn matches(&self, hash: &VerificationHash) -> bool {
        match BASE64.decode(hash.as_str()) {
            Ok(expected) => self.verifier.as_slice().ct_eq(&expected).into(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyHandle(<non-extractable>)")
    }
}

impl Drop for KeyHandle {
    fn drop(&mut self) {
        self.verifier.zeroize();
    }
}

/// HKDF-SHA256 extract-and-expand into a 32-byte key.
pub(crate) fn hkdf_expand(ikm: &[u8], salt: Option<&[u8]>, info: &[u8]) -> Result<RawKey> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = RawKey::zeroed();
    hk.expand(info, okm.as_mut_bytes())
        .map_err(|e| VaultCoreError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}
