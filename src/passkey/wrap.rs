//! Master-key wrapping under a PRF-derived key.
//!
//! Wrapped layout (base64 text):
//!   [ tag = 1 | 12-byte nonce | AES-256-GCM(raw master key) ]
//!
//! The wrapping key is HKDF-SHA256 over the PRF output, salted with the
//! credential id so one output can never unwrap another credential's key.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroizing;

use crate::crypto::encryption::{cipher_for, open, seal, BlobVersion};
use crate::crypto::keys::{hkdf_expand, RawKey};
use crate::errors::{Result, VaultCoreError};

const WRAP_INFO: &[u8] = b"zkvault-passkey-wrap-v1";

pub(crate) fn wrap_master_key(
    master: &RawKey,
    prf_output: &[u8],
    credential_id: &str,
) -> Result<String> {
    let wrapping = hkdf_expand(prf_output, Some(credential_id.as_bytes()), WRAP_INFO)?;
    let cipher = cipher_for(&wrapping)?;
    let sealed = seal(&cipher, master.as_bytes())?;

    let mut blob = Vec::with_capacity(1 + sealed.len());
    blob.push(BlobVersion::Symmetric.tag());
    blob.extend_from_slice(&sealed);
    Ok(BASE64.encode(blob))
}

/// Recover the raw master key. The returned buffer wipes itself on drop.
pub(crate) fn unwrap_master_key(
    wrapped: &str,
    prf_output: &[u8],
    credential_id: &str,
) -> Result<RawKey> {
    let blob = BASE64
        .decode(wrapped)
        .map_err(|_| VaultCoreError::DecryptionFailed)?;
    let sealed = match blob.split_first() {
        Some((&tag, rest)) if tag == BlobVersion::Symmetric.tag() => rest,
        _ => return Err(VaultCoreError::DecryptionFailed),
    };

    let wrapping = hkdf_expand(prf_output, Some(credential_id.as_bytes()), WRAP_INFO)?;
    let cipher = cipher_for(&wrapping)?;
    let raw = Zeroizing::new(open(&cipher, sealed)?);
    RawKey::from_slice(&raw).map_err(|_| VaultCoreError::DecryptionFailed)
}
