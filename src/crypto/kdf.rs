//! Password-based key derivation using Argon2id with versioned parameters.
//!
//! Every stored credential records the KDF version it was derived with.
//! The parameters behind a version never change once shipped; stronger
//! settings are introduced as a new version and existing credentials are
//! moved forward with `attempt_kdf_upgrade`.

use std::collections::BTreeMap;

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use tracing::info;

use super::keys::{KeyHandle, RawKey, VerificationHash, KEY_LEN};
use crate::errors::{Result, VaultCoreError};

/// Length of freshly generated salts in bytes.
pub const SALT_LEN: usize = 16;

/// Argon2id parameters pinned to a KDF version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of iterations.
    pub iterations: u32,
    /// Parallelism lanes.
    pub parallelism: u32,
}

/// Version 1: 64 MiB, 3 iterations, 4 lanes.
pub const KDF_V1: KdfParams = KdfParams {
    memory_kib: 65_536,
    iterations: 3,
    parallelism: 4,
};

/// Version 2: 128 MiB, 3 iterations, 4 lanes.
pub const KDF_V2: KdfParams = KdfParams {
    memory_kib: 131_072,
    iterations: 3,
    parallelism: 4,
};

/// Version new credentials are derived with.
pub const CURRENT_KDF_VERSION: u32 = 2;

/// Result of `attempt_kdf_upgrade`.
pub struct KdfUpgrade {
    /// `true` if the credential was re-derived at a newer version.
    pub upgraded: bool,
    /// The version the caller should now consider active.
    pub active_version: u32,
    /// Key derived at `active_version` (only on upgrade).
    pub new_key: Option<KeyHandle>,
    /// Verifier for `new_key` (only on upgrade).
    pub new_verifier: Option<VerificationHash>,
}

/// A freshly enrolled password credential.
pub struct NewCredential {
    pub salt: Vec<u8>,
    pub verifier: VerificationHash,
    pub kdf_version: u32,
    pub key: KeyHandle,
}

/// Versioned Argon2id derivation.
#[derive(Debug, Clone)]
pub struct KeyDerivationManager {
    versions: BTreeMap<u32, KdfParams>,
    current: u32,
}

impl Default for KeyDerivationManager {
    fn default() -> Self {
        let versions = BTreeMap::from([(1, KDF_V1), (2, KDF_V2)]);
        Self {
            versions,
            current: CURRENT_KDF_VERSION,
        }
    }
}

impl KeyDerivationManager {
    /// Build a manager over an explicit version table.
    ///
    /// `current` must be present in `versions`.
    pub fn with_versions(versions: BTreeMap<u32, KdfParams>, current: u32) -> Result<Self> {
        if !versions.contains_key(&current) {
            return Err(VaultCoreError::UnknownKdfVersion(current));
        }
        Ok(Self { versions, current })
    }

    /// The version new credentials are derived with.
    pub fn current_version(&self) -> u32 {
        self.current
    }

    /// Parameters pinned to `version`.
    pub fn params(&self, version: u32) -> Result<KdfParams> {
        self.versions
            .get(&version)
            .copied()
            .ok_or(VaultCoreError::UnknownKdfVersion(version))
    }

    /// Derive the raw 32-byte key. The returned buffer is zeroed on drop.
    pub fn derive_raw_key(&self, password: &[u8], salt: &[u8], version: u32) -> Result<RawKey> {
        let kdf = self.params(version)?;

        let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(KEY_LEN))
            .map_err(|e| VaultCoreError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = RawKey::zeroed();
        argon2
            .hash_password_into(password, salt, key.as_mut_bytes())
            .map_err(|e| {
                VaultCoreError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}"))
            })?;

        Ok(key)
    }

    /// Derive a non-extractable key handle.
    pub fn derive_key(&self, password: &[u8], salt: &[u8], version: u32) -> Result<KeyHandle> {
        let raw = self.derive_raw_key(password, salt, version)?;
        KeyHandle::from_raw(&raw)
    }

    /// Commit to `key` without exposing it.
    pub fn create_verification_hash(&self, key: &KeyHandle) -> VerificationHash {
        key.verifier()
    }

    /// Check `key` against a stored commitment in constant time.
    pub fn verify_key(&self, hash: &VerificationHash, key: &KeyHandle) -> bool {
        key.matches(hash)
    }

    /// Wrap externally obtained key bytes in the same handle type.
    pub fn import_master_key(&self, raw: &RawKey) -> Result<KeyHandle> {
        KeyHandle::from_raw(raw)
    }

    /// Enroll a new password at the current version with a random salt.
    pub fn create_credential(&self, password: &[u8]) -> Result<NewCredential> {
        let salt = generate_salt().to_vec();
        let key = self.derive_key(password, &salt, self.current)?;
        Ok(NewCredential {
            verifier: key.verifier(),
            salt,
            kdf_version: self.current,
            key,
        })
    }

    /// Re-derive at the current version if `stored_version` is behind.
    ///
    /// Nothing is persisted: the caller commits `new_verifier` when ready.
    pub fn attempt_kdf_upgrade(
        &self,
        password: &[u8],
        salt: &[u8],
        stored_version: u32,
    ) -> Result<KdfUpgrade> {
        // Reject unknown stored versions rather than silently upgrading them.
        self.params(stored_version)?;

        if stored_version >= self.current {
            return Ok(KdfUpgrade {
                upgraded: false,
                active_version: stored_version,
                new_key: None,
                new_verifier: None,
            });
        }

        let key = self.derive_key(password, salt, self.current)?;
        let verifier = key.verifier();
        info!(
            from = stored_version,
            to = self.current,
            "re-derived credential at newer KDF version"
        );

        Ok(KdfUpgrade {
            upgraded: true,
            active_version: self.current,
            new_key: Some(key),
            new_verifier: Some(verifier),
        })
    }
}

/// Generate a cryptographically random salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cheap parameters so unit tests stay fast.
    pub(crate) fn light_manager() -> KeyDerivationManager {
        let light = |memory_kib| KdfParams {
            memory_kib,
            iterations: 1,
            parallelism: 1,
        };
        KeyDerivationManager::with_versions(BTreeMap::from([(1, light(64)), (2, light(128))]), 2)
            .unwrap()
    }

    #[test]
    fn production_table_pins_memory_per_version() {
        let manager = KeyDerivationManager::default();
        assert_eq!(manager.params(1).unwrap().memory_kib, 64 * 1024);
        assert_eq!(manager.params(2).unwrap().memory_kib, 128 * 1024);
        assert_eq!(manager.current_version(), 2);
    }

    #[test]
    fn with_versions_rejects_missing_current() {
        let result = KeyDerivationManager::with_versions(BTreeMap::from([(1, KDF_V1)]), 2);
        assert!(matches!(result, Err(VaultCoreError::UnknownKdfVersion(2))));
    }

    #[test]
    fn versions_produce_different_keys() {
        let manager = light_manager();
        let salt = [7u8; SALT_LEN];
        let v1 = manager.derive_raw_key(b"pw", &salt, 1).unwrap();
        let v2 = manager.derive_raw_key(b"pw", &salt, 2).unwrap();
        assert_ne!(v1.as_bytes(), v2.as_bytes());
    }

    #[test]
    fn upgrade_rejects_unknown_stored_version() {
        let manager = light_manager();
        let result = manager.attempt_kdf_upgrade(b"pw", &[1u8; SALT_LEN], 7);
        assert!(matches!(result, Err(VaultCoreError::UnknownKdfVersion(7))));
    }

    #[test]
    fn create_credential_verifies_against_its_key() {
        let manager = light_manager();
        let cred = manager.create_credential(b"hunter2").unwrap();
        assert_eq!(cred.kdf_version, 2);
        assert_eq!(cred.salt.len(), SALT_LEN);

        let again = manager
            .derive_key(b"hunter2", &cred.salt, cred.kdf_version)
            .unwrap();
        assert!(manager.verify_key(&cred.verifier, &again));
    }
}
