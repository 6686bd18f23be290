//! Dual-password ("duress") unlock.
//!
//! One password attempt is checked against the real credential and, when
//! configured, against an independent duress credential. A match on the
//! real credential yields the real key; a match on the duress credential
//! yields the decoy key; anything else is `Invalid`.
//!
//! Both checks always run a full derivation. When no duress credential is
//! enabled the second derivation uses a throwaway salt at the current KDF
//! version, so an observer timing the attempt cannot tell whether duress
//! is configured.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crypto::kdf::{generate_salt, KeyDerivationManager};
use crate::crypto::keys::{KeyHandle, VerificationHash};
use crate::encoding::{base64_decode, base64_encode};
use crate::errors::{Result, VaultCoreError};

/// Which view an unlock attempt opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockMode {
    Real,
    Duress,
    Invalid,
}

/// Stored material for the real master password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCredential {
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,
    pub verifier: VerificationHash,
    pub kdf_version: u32,
}

/// Stored material for the duress password, independent of the real one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuressConfig {
    pub enabled: bool,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,
    pub verifier: VerificationHash,
    pub kdf_version: u32,
}

impl DuressConfig {
    /// Enroll `duress_password` with a fresh salt at the current version.
    ///
    /// Refuses a password that already opens the real credential, since
    /// the real branch would always win and the decoy would be unreachable.
    pub fn create(
        manager: &KeyDerivationManager,
        duress_password: &[u8],
        real: &PasswordCredential,
    ) -> Result<Self> {
        let real_key = manager.derive_key(duress_password, &real.salt, real.kdf_version)?;
        if real_key.matches(&real.verifier) {
            return Err(VaultCoreError::DuressPasswordReused);
        }

        let credential = manager.create_credential(duress_password)?;
        Ok(Self {
            enabled: true,
            salt: credential.salt,
            verifier: credential.verifier,
            kdf_version: credential.kdf_version,
        })
    }

    /// Turn the duress branch off without discarding its material.
    pub fn disable(&mut self) {
        self.enabled = false;
    }
}

/// Result of one unlock attempt.
#[derive(Debug)]
pub enum UnlockOutcome {
    Real(KeyHandle),
    Duress(KeyHandle),
    Invalid,
}

impl UnlockOutcome {
    pub fn mode(&self) -> UnlockMode {
        match self {
            Self::Real(_) => UnlockMode::Real,
            Self::Duress(_) => UnlockMode::Duress,
            Self::Invalid => UnlockMode::Invalid,
        }
    }

    pub fn key(&self) -> Option<&KeyHandle> {
        match self {
            Self::Real(key) | Self::Duress(key) => Some(key),
            Self::Invalid => None,
        }
    }

    pub fn into_key(self) -> Option<KeyHandle> {
        match self {
            Self::Real(key) | Self::Duress(key) => Some(key),
            Self::Invalid => None,
        }
    }
}

/// Chooses between the real and the decoy key for one password attempt.
#[derive(Debug, Clone, Default)]
pub struct DualUnlockAuthenticator {
    manager: KeyDerivationManager,
}

impl DualUnlockAuthenticator {
    pub fn new(manager: KeyDerivationManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &KeyDerivationManager {
        &self.manager
    }

    /// Check `password` against both credentials.
    ///
    /// An unknown KDF version on the real credential is returned as an
    /// error. A duress credential with an unknown version is treated as a
    /// non-match so its presence never changes the real branch's outcome.
    pub fn attempt(
        &self,
        password: &[u8],
        real: &PasswordCredential,
        duress: Option<&DuressConfig>,
    ) -> Result<UnlockOutcome> {
        let real_key = self
            .manager
            .derive_key(password, &real.salt, real.kdf_version)?;
        let real_ok = real_key.matches(&real.verifier);

        let duress_key = match duress.filter(|d| d.enabled) {
            Some(config) => {
                match self
                    .manager
                    .derive_key(password, &config.salt, config.kdf_version)
                {
                    Ok(key) => key.matches(&config.verifier).then_some(key),
                    Err(VaultCoreError::UnknownKdfVersion(version)) => {
                        warn!(version, "duress credential has an unknown KDF version");
                        self.stand_in_derivation(password)?;
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                self.stand_in_derivation(password)?;
                None
            }
        };

        Ok(match (real_ok, duress_key) {
            (true, _) => UnlockOutcome::Real(real_key),
            (false, Some(key)) => UnlockOutcome::Duress(key),
            (false, None) => UnlockOutcome::Invalid,
        })
    }

    /// Same cost as a duress check at the version new credentials use;
    /// the result is discarded.
    fn stand_in_derivation(&self, password: &[u8]) -> Result<()> {
        let salt = generate_salt();
        self.manager
            .derive_key(password, &salt, self.manager.current_version())?;
        Ok(())
    }
}
