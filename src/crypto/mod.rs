//! Cryptographic primitives for the vault core.
//!
//! This module provides:
//! - AES-256-GCM encryption and the tagged blob format (`encryption`)
//! - Versioned Argon2id password-based key derivation (`kdf`)
//! - Raw key buffers, opaque key handles and verifiers (`keys`)
//! - ML-KEM + RSA-OAEP hybrid key wrapping (`hybrid`)

pub mod encryption;
pub mod hybrid;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, KeyDerivationManager, ...};
pub use encryption::{decrypt, decrypt_string, encrypt, encrypt_string, BlobVersion};
pub use hybrid::{
    generate_hybrid_key_pair, hybrid_decrypt, hybrid_encrypt, hybrid_unwrap_key, hybrid_wrap_key,
    is_hybrid_encrypted, migrate_to_hybrid, HybridKeyPair, HybridPublicKeys, HybridSecretKeys,
    StoredKeyPair,
};
pub use kdf::{generate_salt, KdfParams, KdfUpgrade, KeyDerivationManager, NewCredential};
pub use keys::{KeyHandle, RawKey, VerificationHash};
