//! Tamper-evidence over the encrypted item set.
//!
//! The verifier keeps an HMAC-SHA256 digest over the canonical ordering of
//! `(id, encrypted_data)` pairs, stored locally per user. The digest never
//! touches plaintext, so it works whether or not a row can be decrypted.
//!
//! The first check for a user establishes the baseline (trust on first
//! use). After that the baseline only moves through `update_integrity_root`
//! or an explicit `clear_integrity_root`.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::Mac;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::crypto::kdf::KeyDerivationManager;
use crate::crypto::keys::{hkdf_expand, KeyHandle};
use crate::errors::Result;
use crate::storage::IntegrityRootStore;
use crate::vault::item::VaultItemRow;

const INTEGRITY_INFO: &[u8] = b"zkvault-integrity-key-v1";

/// Stored baseline for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityRoot {
    pub user_id: String,
    /// HMAC-SHA256 over the canonical item set (base64).
    pub digest: String,
    pub item_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Result of `verify_vault_integrity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityCheck {
    pub valid: bool,
    pub is_first_check: bool,
}

/// Computes, stores and checks integrity roots.
pub struct IntegrityVerifier {
    store: Arc<dyn IntegrityRootStore>,
    manager: KeyDerivationManager,
}

impl IntegrityVerifier {
    pub fn new(store: Arc<dyn IntegrityRootStore>, manager: KeyDerivationManager) -> Self {
        Self { store, manager }
    }

    /// Derive a key used only for integrity digests.
    ///
    /// Runs the password KDF at the current version and separates the
    /// result from the encryption key with HKDF, so the two never coincide.
    pub fn derive_integrity_key(&self, password: &[u8], salt: &[u8]) -> Result<KeyHandle> {
        let raw = self
            .manager
            .derive_raw_key(password, salt, self.manager.current_version())?;
        let integrity = hkdf_expand(raw.as_bytes(), None, INTEGRITY_INFO)?;
        KeyHandle::from_raw(&integrity)
    }

    /// Recompute the digest for `items` and store it as the new baseline.
    pub async fn update_integrity_root(
        &self,
        items: &[VaultItemRow],
        key: &KeyHandle,
        user_id: &str,
    ) -> Result<()> {
        let root = IntegrityRoot {
            user_id: user_id.to_string(),
            digest: BASE64.encode(compute_digest(items, key)),
            item_count: items.len(),
            updated_at: Utc::now(),
        };
        self.store.save_root(&root).await
    }

    /// Compare `items` against the stored baseline.
    ///
    /// With no baseline yet, one is established and the set is accepted.
    pub async fn verify_vault_integrity(
        &self,
        items: &[VaultItemRow],
        key: &KeyHandle,
        user_id: &str,
    ) -> Result<IntegrityCheck> {
        let Some(root) = self.store.load_root(user_id).await? else {
            self.update_integrity_root(items, key, user_id).await?;
            info!(%user_id, items = items.len(), "established integrity baseline");
            return Ok(IntegrityCheck {
                valid: true,
                is_first_check: true,
            });
        };

        let valid = match BASE64.decode(&root.digest) {
            Ok(expected) => digest_mac(items, key).verify_slice(&expected).is_ok(),
            Err(_) => false,
        };
        if !valid {
            warn!(
                %user_id,
                stored_count = root.item_count,
                current_count = items.len(),
                "vault integrity mismatch"
            );
        }

        Ok(IntegrityCheck {
            valid,
            is_first_check: false,
        })
    }

    /// Forget the baseline so the next check re-establishes it.
    pub async fn clear_integrity_root(&self, user_id: &str) -> Result<()> {
        self.store.delete_root(user_id).await
    }

    pub async fn has_integrity_root(&self, user_id: &str) -> Result<bool> {
        Ok(self.store.load_root(user_id).await?.is_some())
    }
}

fn compute_digest(items: &[VaultItemRow], key: &KeyHandle) -> Vec<u8> {
    digest_mac(items, key).finalize().into_bytes().to_vec()
}

/// Feed the canonical encoding of `items` into a fresh MAC.
///
/// Rows are ordered by id; every field is length-prefixed so no two
/// distinct sets share an encoding.
fn digest_mac(items: &[VaultItemRow], key: &KeyHandle) -> hmac::Hmac<sha2::Sha256> {
    let mut sorted: Vec<&VaultItemRow> = items.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut mac = key.mac();
    mac.update(&(sorted.len() as u64).to_be_bytes());
    for row in sorted {
        for field in [row.id.as_bytes(), row.encrypted_data.as_bytes()] {
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field);
        }
    }
    mac
}
