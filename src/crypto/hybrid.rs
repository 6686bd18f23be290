//! Hybrid ML-KEM-768 + RSA-OAEP key wrapping.
//!
//! A per-message secret is established through both primitives and the
//! two secrets are combined with HKDF into one AES-256-GCM key. Breaking
//! either primitive alone does not recover the payload.
//!
//! Layout of a hybrid blob (base64 when stored):
//!
//! ```text
//! [tag = 3][ML-KEM ciphertext: 1088][RSA ct len: u16 BE][RSA ciphertext][nonce][AES-GCM ct + tag]
//! ```
//!
//! The legacy RSA-only layout (tag 2) is readable here solely so it can be
//! migrated forward; `hybrid_decrypt` refuses it.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pqcrypto_mlkem::mlkem768;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use super::encryption::{self, BlobVersion, NONCE_LEN, TAG_LEN};
use super::keys::{hkdf_expand, KeyHandle, RawKey, KEY_LEN};
use crate::errors::{Result, VaultCoreError};

/// RSA modulus size used for new key pairs.
pub const DEFAULT_RSA_BITS: usize = 4096;

/// Smallest modulus accepted for new key pairs.
pub const MIN_RSA_BITS: usize = 2048;

/// Version stamped on every key pair generated by this module.
pub const KEY_PAIR_VERSION: u32 = 1;

const COMBINE_INFO: &[u8] = b"zkvault-hybrid-v3";
const RSA_LEN_FIELD: usize = 2;

/// Public halves of a principal's hybrid key pair.
#[derive(Clone)]
pub struct HybridPublicKeys {
    pq: mlkem768::PublicKey,
    rsa: RsaPublicKey,
}

/// Private halves of a principal's hybrid key pair.
pub struct HybridSecretKeys {
    pq: mlkem768::SecretKey,
    rsa: RsaPrivateKey,
}

/// One ML-KEM pair and one RSA-OAEP pair owned by a single principal.
pub struct HybridKeyPair {
    pub public: HybridPublicKeys,
    pub secret: HybridSecretKeys,
    pub key_version: u32,
}

impl fmt::Debug for HybridPublicKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridPublicKeys").finish_non_exhaustive()
    }
}

impl fmt::Debug for HybridSecretKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HybridSecretKeys(<redacted>)")
    }
}

/// Public keys encoded for transport and storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPublicKeys {
    /// ML-KEM-768 public key (base64).
    pub pq_public_key: String,
    /// RSA public key, SPKI DER (base64).
    pub rsa_public_key: String,
}

/// Private key bytes as they travel inside an encrypted envelope.
#[derive(Serialize, Deserialize, Zeroize)]
#[zeroize(drop)]
struct EncodedSecretKeys {
    pq_secret_key: String,
    rsa_private_key: String,
}

/// A key pair at rest: public halves in the clear, private halves
/// encrypted under the owner's master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKeyPair {
    #[serde(flatten)]
    pub public: EncodedPublicKeys,
    /// Symmetric blob (base64) holding the encoded private halves.
    pub encrypted_private_keys: String,
    pub key_version: u32,
}

/// Generate a key pair with the default RSA modulus.
pub fn generate_hybrid_key_pair() -> Result<HybridKeyPair> {
    generate_hybrid_key_pair_with_bits(DEFAULT_RSA_BITS)
}

/// Generate a key pair with an explicit RSA modulus size.
pub fn generate_hybrid_key_pair_with_bits(rsa_bits: usize) -> Result<HybridKeyPair> {
    if rsa_bits < MIN_RSA_BITS {
        return Err(VaultCoreError::KeyGeneration(format!(
            "RSA modulus must be at least {MIN_RSA_BITS} bits (got {rsa_bits})"
        )));
    }

    let (pq_public, pq_secret) = mlkem768::keypair();
    let rsa_private = RsaPrivateKey::new(&mut OsRng, rsa_bits)
        .map_err(|e| VaultCoreError::KeyGeneration(format!("RSA key generation failed: {e}")))?;
    let rsa_public = RsaPublicKey::from(&rsa_private);

    Ok(HybridKeyPair {
        public: HybridPublicKeys {
            pq: pq_public,
            rsa: rsa_public,
        },
        secret: HybridSecretKeys {
            pq: pq_secret,
            rsa: rsa_private,
        },
        key_version: KEY_PAIR_VERSION,
    })
}

impl HybridPublicKeys {
    pub fn encode(&self) -> Result<EncodedPublicKeys> {
        let rsa_der = self
            .rsa
            .to_public_key_der()
            .map_err(|e| VaultCoreError::Serialization(format!("RSA public key: {e}")))?;
        Ok(EncodedPublicKeys {
            pq_public_key: BASE64.encode(self.pq.as_bytes()),
            rsa_public_key: BASE64.encode(rsa_der.as_bytes()),
        })
    }

    pub fn decode(encoded: &EncodedPublicKeys) -> Result<Self> {
        let pq_bytes = decode_b64(&encoded.pq_public_key, "ML-KEM public key")?;
        let pq = mlkem768::PublicKey::from_bytes(&pq_bytes)
            .map_err(|e| VaultCoreError::InvalidFormat(format!("ML-KEM public key: {e}")))?;

        let rsa_bytes = decode_b64(&encoded.rsa_public_key, "RSA public key")?;
        let rsa = RsaPublicKey::from_public_key_der(&rsa_bytes)
            .map_err(|e| VaultCoreError::InvalidFormat(format!("RSA public key: {e}")))?;

        Ok(Self { pq, rsa })
    }
}

impl HybridKeyPair {
    /// Encrypt the private halves under `master_key` for storage.
    pub fn seal(&self, master_key: &KeyHandle) -> Result<StoredKeyPair> {
        let rsa_der = self
            .secret
            .rsa
            .to_pkcs8_der()
            .map_err(|e| VaultCoreError::Serialization(format!("RSA private key: {e}")))?;

        let secrets = EncodedSecretKeys {
            pq_secret_key: BASE64.encode(self.secret.pq.as_bytes()),
            rsa_private_key: BASE64.encode(rsa_der.as_bytes()),
        };
        let json = Zeroizing::new(
            serde_json::to_string(&secrets)
                .map_err(|e| VaultCoreError::Serialization(format!("private keys: {e}")))?,
        );

        Ok(StoredKeyPair {
            public: self.public.encode()?,
            encrypted_private_keys: encryption::encrypt_string(master_key, &json)?,
            key_version: self.key_version,
        })
    }
}

impl StoredKeyPair {
    /// Decrypt the private halves with the owner's master key.
    pub fn open(&self, master_key: &KeyHandle) -> Result<HybridKeyPair> {
        let json = Zeroizing::new(encryption::decrypt_string(
            master_key,
            &self.encrypted_private_keys,
        )?);
        let secrets: EncodedSecretKeys = serde_json::from_str(&json)
            .map_err(|e| VaultCoreError::InvalidFormat(format!("private keys: {e}")))?;

        let pq_bytes = Zeroizing::new(decode_b64(&secrets.pq_secret_key, "ML-KEM secret key")?);
        let pq = mlkem768::SecretKey::from_bytes(&pq_bytes)
            .map_err(|e| VaultCoreError::InvalidFormat(format!("ML-KEM secret key: {e}")))?;

        let rsa_bytes = Zeroizing::new(decode_b64(&secrets.rsa_private_key, "RSA private key")?);
        let rsa = RsaPrivateKey::from_pkcs8_der(&rsa_bytes)
            .map_err(|e| VaultCoreError::InvalidFormat(format!("RSA private key: {e}")))?;

        Ok(HybridKeyPair {
            public: HybridPublicKeys::decode(&self.public)?,
            secret: HybridSecretKeys { pq, rsa },
            key_version: self.key_version,
        })
    }
}

/// Encrypt `plaintext` for the holder of `recipient`'s private keys.
pub fn hybrid_encrypt(plaintext: &[u8], recipient: &HybridPublicKeys) -> Result<String> {
    let (shared, kem_ct) = mlkem768::encapsulate(&recipient.pq);

    let rsa_secret = RawKey::generate();
    let rsa_ct = recipient
        .rsa
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), rsa_secret.as_bytes())
        .map_err(|e| VaultCoreError::EncryptionFailed(format!("RSA-OAEP: {e}")))?;
    let rsa_len = u16::try_from(rsa_ct.len()).map_err(|_| {
        VaultCoreError::EncryptionFailed(format!("RSA ciphertext too long: {}", rsa_ct.len()))
    })?;

    let content_key = combine_secrets(shared.as_bytes(), rsa_secret.as_bytes())?;
    let sealed = encryption::seal(&encryption::cipher_for(&content_key)?, plaintext)?;

    let mut out = Vec::with_capacity(
        1 + kem_ct.as_bytes().len() + RSA_LEN_FIELD + rsa_ct.len() + sealed.len(),
    );
    out.push(BlobVersion::Hybrid.tag());
    out.extend_from_slice(kem_ct.as_bytes());
    out.extend_from_slice(&rsa_len.to_be_bytes());
    out.extend_from_slice(&rsa_ct);
    out.extend_from_slice(&sealed);
    Ok(BASE64.encode(out))
}

/// Decrypt a current-version hybrid blob.
///
/// Any other version tag is refused with `VersionMismatch`, even when the
/// keys could read it.
pub fn hybrid_decrypt(ciphertext: &str, secret: &HybridSecretKeys) -> Result<Vec<u8>> {
    let raw = decode_b64(ciphertext, "hybrid ciphertext")?;
    let (&tag, body) = raw
        .split_first()
        .ok_or_else(|| VaultCoreError::InvalidFormat("empty ciphertext".into()))?;
    if tag != BlobVersion::Hybrid.tag() {
        return Err(VaultCoreError::VersionMismatch {
            expected: BlobVersion::Hybrid.tag(),
            found: tag,
        });
    }

    let kem_len = mlkem768::ciphertext_bytes();
    if body.len() < kem_len {
        return Err(VaultCoreError::InvalidFormat("truncated KEM ciphertext".into()));
    }
    let (kem_bytes, rest) = body.split_at(kem_len);
    let kem_ct = mlkem768::Ciphertext::from_bytes(kem_bytes)
        .map_err(|e| VaultCoreError::InvalidFormat(format!("KEM ciphertext: {e}")))?;
    let (rsa_ct, sealed) = split_rsa_section(rest)?;

    let shared = mlkem768::decapsulate(&kem_ct, &secret.pq);
    let rsa_secret = Zeroizing::new(
        secret
            .rsa
            .decrypt(Oaep::new::<Sha256>(), rsa_ct)
            .map_err(|_| VaultCoreError::DecryptionFailed)?,
    );

    let content_key = combine_secrets(shared.as_bytes(), &rsa_secret)?;
    encryption::open(&encryption::cipher_for(&content_key)?, sealed)
}

/// Wrap a raw symmetric key (e.g. a shared-collection key).
pub fn hybrid_wrap_key(key: &RawKey, recipient: &HybridPublicKeys) -> Result<String> {
    hybrid_encrypt(key.as_bytes(), recipient)
}

/// Unwrap a key produced by `hybrid_wrap_key`.
pub fn hybrid_unwrap_key(wrapped: &str, secret: &HybridSecretKeys) -> Result<RawKey> {
    let bytes = Zeroizing::new(hybrid_decrypt(wrapped, secret)?);
    RawKey::from_slice(&bytes)
}

/// `true` only for well-framed current-version hybrid text. Never errors.
pub fn is_hybrid_encrypted(blob: &str) -> bool {
    let Ok(raw) = BASE64.decode(blob) else {
        return false;
    };
    let min_len = 1 + mlkem768::ciphertext_bytes() + RSA_LEN_FIELD + NONCE_LEN + TAG_LEN;
    raw.len() >= min_len && raw[0] == BlobVersion::Hybrid.tag()
}

/// Bring `blob` to the current hybrid format.
///
/// Current-version blobs are returned unchanged. Legacy RSA envelopes are
/// opened with the owner's private key and re-encrypted for `new_public`.
pub fn migrate_to_hybrid(
    blob: &str,
    owner: &HybridSecretKeys,
    new_public: &HybridPublicKeys,
) -> Result<String> {
    if is_hybrid_encrypted(blob) {
        return Ok(blob.to_string());
    }

    let raw = decode_b64(blob, "legacy ciphertext")?;
    match raw.split_first() {
        Some((&tag, body)) if tag == BlobVersion::LegacyAsymmetric.tag() => {
            let plaintext = Zeroizing::new(legacy_decrypt(body, owner)?);
            debug!("migrated legacy RSA envelope to hybrid format");
            hybrid_encrypt(&plaintext, new_public)
        }
        Some((&tag, _)) => Err(VaultCoreError::InvalidFormat(format!(
            "cannot migrate blob with format tag {tag}"
        ))),
        None => Err(VaultCoreError::InvalidFormat("empty ciphertext".into())),
    }
}

fn legacy_decrypt(body: &[u8], owner: &HybridSecretKeys) -> Result<Vec<u8>> {
    let (rsa_ct, sealed) = split_rsa_section(body)?;
    let content_key = Zeroizing::new(
        owner
            .rsa
            .decrypt(Oaep::new::<Sha256>(), rsa_ct)
            .map_err(|_| VaultCoreError::DecryptionFailed)?,
    );
    let content_key = RawKey::from_slice(&content_key)?;
    encryption::open(&encryption::cipher_for(&content_key)?, sealed)
}

/// Split `[len: u16 BE][RSA ciphertext][rest]`.
fn split_rsa_section(data: &[u8]) -> Result<(&[u8], &[u8])> {
    if data.len() < RSA_LEN_FIELD {
        return Err(VaultCoreError::InvalidFormat("truncated RSA length".into()));
    }
    let (len_bytes, rest) = data.split_at(RSA_LEN_FIELD);
    let rsa_len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
    if rest.len() < rsa_len {
        return Err(VaultCoreError::InvalidFormat("truncated RSA ciphertext".into()));
    }
    Ok(rest.split_at(rsa_len))
}

fn combine_secrets(kem_secret: &[u8], rsa_secret: &[u8]) -> Result<RawKey> {
    if rsa_secret.len() != KEY_LEN {
        return Err(VaultCoreError::DecryptionFailed);
    }
    let mut ikm = Zeroizing::new(Vec::with_capacity(kem_secret.len() + rsa_secret.len()));
    ikm.extend_from_slice(kem_secret);
    ikm.extend_from_slice(rsa_secret);
    hkdf_expand(&ikm, None, COMBINE_INFO)
}

fn decode_b64(text: &str, what: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| VaultCoreError::InvalidFormat(format!("{what}: {e}")))
}
