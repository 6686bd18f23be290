//! Per-user hybrid key pair provisioning.
//!
//! Two devices can race to create the first key pair for the same user.
//! Provisioning is a compare-and-swap: read, and if nothing is stored,
//! insert-if-absent. A lost race surfaces as `StorageConflict` from the
//! remote store and the loop re-reads the winner. The loop runs at most
//! `max_attempts` times.

use std::sync::Arc;

use tracing::{debug, info};

use crate::crypto::hybrid::{
    generate_hybrid_key_pair_with_bits, HybridKeyPair, HybridPublicKeys, DEFAULT_RSA_BITS,
};
use crate::config::Settings;
use crate::crypto::keys::KeyHandle;
use crate::errors::{Result, VaultCoreError};
use crate::remote::RemoteVault;

pub const DEFAULT_PROVISION_ATTEMPTS: u32 = 3;

/// The user's key pair after `ensure_key_pair`.
pub struct ProvisionedKeys {
    pub public: HybridPublicKeys,
    /// Private halves, present when a master key was supplied.
    pub key_pair: Option<HybridKeyPair>,
    /// This call generated and stored the pair.
    pub created: bool,
}

pub struct KeyPairProvisioner {
    remote: Arc<dyn RemoteVault>,
    rsa_bits: usize,
    max_attempts: u32,
}

impl KeyPairProvisioner {
    pub fn new(remote: Arc<dyn RemoteVault>) -> Self {
        Self {
            remote,
            rsa_bits: DEFAULT_RSA_BITS,
            max_attempts: DEFAULT_PROVISION_ATTEMPTS,
        }
    }

    /// A provisioner using the configured modulus size and attempt bound.
    pub fn from_settings(remote: Arc<dyn RemoteVault>, settings: &Settings) -> Self {
        Self::new(remote)
            .with_rsa_bits(settings.rsa_modulus_bits)
            .with_max_attempts(settings.key_provision_attempts)
    }

    pub fn with_rsa_bits(mut self, rsa_bits: usize) -> Self {
        self.rsa_bits = rsa_bits;
        self
    }

    /// Bound on read/insert rounds. Values below 1 are treated as 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Return the user's key pair, creating it if none exists.
    ///
    /// An existing pair is returned with its private halves opened when
    /// `master_key` is given, or public halves only otherwise. Creating a
    /// pair needs the master key to seal it; without one this fails with
    /// `MasterPasswordRequired`.
    pub async fn ensure_key_pair(
        &self,
        user_id: &str,
        master_key: Option<&KeyHandle>,
    ) -> Result<ProvisionedKeys> {
        for attempt in 1..=self.max_attempts {
            if let Some(stored) = self.remote.fetch_key_pair(user_id).await? {
                let key_pair = master_key.map(|key| stored.open(key)).transpose()?;
                let public = match &key_pair {
                    Some(pair) => pair.public.clone(),
                    None => HybridPublicKeys::decode(&stored.public)?,
                };
                return Ok(ProvisionedKeys {
                    public,
                    key_pair,
                    created: false,
                });
            }

            let master_key = master_key.ok_or(VaultCoreError::MasterPasswordRequired)?;
            let pair = self.generate().await?;
            let sealed = pair.seal(master_key)?;

            match self.remote.insert_key_pair(user_id, &sealed).await {
                Ok(()) => {
                    info!(%user_id, "provisioned hybrid key pair");
                    return Ok(ProvisionedKeys {
                        public: pair.public.clone(),
                        key_pair: Some(pair),
                        created: true,
                    });
                }
                Err(VaultCoreError::StorageConflict) => {
                    debug!(%user_id, attempt, "key pair insert lost a race, re-reading");
                }
                Err(e) => return Err(e),
            }
        }

        Err(VaultCoreError::StorageConflict)
    }

    /// RSA generation is CPU-heavy; keep it off the async workers.
    async fn generate(&self) -> Result<HybridKeyPair> {
        let bits = self.rsa_bits;
        tokio::task::spawn_blocking(move || generate_hybrid_key_pair_with_bits(bits))
            .await
            .map_err(|e| VaultCoreError::KeyGeneration(format!("generation task failed: {e}")))?
    }
}
