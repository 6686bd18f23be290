//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use zeroize::Zeroizing;

use zkvault::crypto::hybrid::StoredKeyPair;
use zkvault::crypto::kdf::{KdfParams, KeyDerivationManager};
use zkvault::errors::{Result, VaultCoreError};
use zkvault::passkey::{
    AuthenticationOptions, AuthenticationResponse, Authenticator, Ceremony, CredentialSalt,
    PasskeyCredential, PasskeyServer, RegistrationOptions, RegistrationResponse,
    VerifiedAuthentication, WrapStatus,
};
use zkvault::remote::{RemoteVault, RemoteVaultState};
use zkvault::vault::{CategoryRow, ItemType, VaultItemRow};

/// KDF table cheap enough for debug-mode tests.
pub fn light_manager() -> KeyDerivationManager {
    let light = |memory_kib| KdfParams {
        memory_kib,
        iterations: 1,
        parallelism: 1,
    };
    KeyDerivationManager::with_versions(BTreeMap::from([(1, light(64)), (2, light(128))]), 2)
        .expect("light table")
}

pub fn item_row(id: &str, vault_id: &str, blob: &str) -> VaultItemRow {
    let now = Utc::now();
    VaultItemRow {
        id: id.to_string(),
        vault_id: vault_id.to_string(),
        encrypted_data: blob.to_string(),
        item_type: ItemType::Password,
        is_decoy: false,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Remote store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RemoteState {
    vault_id: Option<String>,
    items: Vec<VaultItemRow>,
    categories: Vec<CategoryRow>,
    key_pairs: BTreeMap<String, StoredKeyPair>,
    /// Item ids whose upsert is rejected as a constraint violation.
    rejected_items: HashSet<String>,
    /// Fail every call with `ConnectivityUnavailable`.
    unreachable: bool,
    /// Fail after this many more successful writes.
    writes_before_outage: Option<usize>,
    /// Inserted by "another device" just before our next key pair insert.
    racing_key_pair: Option<StoredKeyPair>,
    /// Every successful write, in order.
    log: Vec<String>,
}

/// A remote store double that records every call it serves.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
    calls: AtomicUsize,
}

impl FakeRemote {
    pub fn with_vault(vault_id: &str) -> Self {
        let remote = Self::default();
        remote.state.lock().unwrap().vault_id = Some(vault_id.to_string());
        remote
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn reject_item(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_items
            .insert(id.to_string());
    }

    pub fn accept_item(&self, id: &str) {
        self.state.lock().unwrap().rejected_items.remove(id);
    }

    pub fn fail_after_writes(&self, writes: usize) {
        self.state.lock().unwrap().writes_before_outage = Some(writes);
    }

    pub fn race_key_pair_insert(&self, winner: StoredKeyPair) {
        self.state.lock().unwrap().racing_key_pair = Some(winner);
    }

    pub fn seed_item(&self, row: VaultItemRow) {
        self.state.lock().unwrap().items.push(row);
    }

    pub fn items(&self) -> Vec<VaultItemRow> {
        self.state.lock().unwrap().items.clone()
    }

    pub fn write_log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn stored_key_pair(&self, user_id: &str) -> Option<StoredKeyPair> {
        self.state.lock().unwrap().key_pairs.get(user_id).cloned()
    }

    /// Number of calls made against this remote, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<std::sync::MutexGuard<'_, RemoteState>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(VaultCoreError::ConnectivityUnavailable);
        }
        Ok(state)
    }

    fn enter_write(&self) -> Result<std::sync::MutexGuard<'_, RemoteState>> {
        let mut state = self.enter()?;
        let remaining = state.writes_before_outage;
        match remaining {
            Some(0) => {
                state.writes_before_outage = None;
                state.unreachable = true;
                Err(VaultCoreError::ConnectivityUnavailable)
            }
            Some(n) => {
                state.writes_before_outage = Some(n - 1);
                Ok(state)
            }
            None => Ok(state),
        }
    }
}

#[async_trait]
impl RemoteVault for FakeRemote {
    async fn fetch_vault(&self, _user_id: &str) -> Result<RemoteVaultState> {
        let state = self.enter()?;
        Ok(RemoteVaultState {
            vault_id: state.vault_id.clone().unwrap_or_default(),
            items: state.items.clone(),
            categories: state.categories.clone(),
        })
    }

    async fn default_vault_id(&self, _user_id: &str) -> Result<Option<String>> {
        Ok(self.enter()?.vault_id.clone())
    }

    async fn upsert_item(&self, row: &VaultItemRow) -> Result<()> {
        let mut state = self.enter_write()?;
        if state.rejected_items.contains(&row.id) {
            return Err(VaultCoreError::Remote(format!(
                "unique constraint violated for {}",
                row.id
            )));
        }
        match state.items.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row.clone(),
            None => state.items.push(row.clone()),
        }
        state.log.push(format!("upsert_item:{}", row.id));
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<()> {
        let mut state = self.enter_write()?;
        state.items.retain(|r| r.id != id);
        state.log.push(format!("delete_item:{id}"));
        Ok(())
    }

    async fn upsert_category(&self, row: &CategoryRow) -> Result<()> {
        let mut state = self.enter_write()?;
        match state.categories.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row.clone(),
            None => state.categories.push(row.clone()),
        }
        state.log.push(format!("upsert_category:{}", row.id));
        Ok(())
    }

    async fn delete_category(&self, id: &str) -> Result<()> {
        let mut state = self.enter_write()?;
        state.categories.retain(|r| r.id != id);
        state.log.push(format!("delete_category:{id}"));
        Ok(())
    }

    async fn fetch_key_pair(&self, user_id: &str) -> Result<Option<StoredKeyPair>> {
        Ok(self.enter()?.key_pairs.get(user_id).cloned())
    }

    async fn insert_key_pair(&self, user_id: &str, pair: &StoredKeyPair) -> Result<()> {
        let mut state = self.enter()?;
        if let Some(winner) = state.racing_key_pair.take() {
            state.key_pairs.insert(user_id.to_string(), winner);
        }
        if state.key_pairs.contains_key(user_id) {
            return Err(VaultCoreError::StorageConflict);
        }
        state.key_pairs.insert(user_id.to_string(), pair.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Passkey server and authenticator
// ---------------------------------------------------------------------------

struct ServerCredential {
    public: PasskeyCredential,
    salt: Vec<u8>,
    wrapped_key: Option<String>,
}

/// Trusted-server double. Accepts every attestation and assertion.
#[derive(Default)]
pub struct FakePasskeyServer {
    credentials: Mutex<Vec<ServerCredential>>,
}

impl FakePasskeyServer {
    pub fn wrapped_key(&self, credential_id: &str) -> Option<String> {
        self.credentials
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.public.id == credential_id)
            .and_then(|c| c.wrapped_key.clone())
    }
}

const PENDING_SALT: &[u8] = b"salt-for-next-credential";

#[async_trait]
impl PasskeyServer for FakePasskeyServer {
    async fn generate_registration_options(
        &self,
        device_label: &str,
    ) -> Result<RegistrationOptions> {
        Ok(RegistrationOptions {
            options: serde_json::json!({ "label": device_label }),
            prf_salt: PENDING_SALT.to_vec(),
        })
    }

    async fn verify_registration(
        &self,
        credential_id: &str,
        _attestation: &serde_json::Value,
        device_label: &str,
    ) -> Result<()> {
        self.credentials.lock().unwrap().push(ServerCredential {
            public: PasskeyCredential {
                id: credential_id.to_string(),
                device_label: device_label.to_string(),
                created_at: Utc::now(),
                last_used_at: None,
                wrap_status: WrapStatus::NeedsActivation,
            },
            salt: PENDING_SALT.to_vec(),
            wrapped_key: None,
        });
        Ok(())
    }

    async fn generate_authentication_options(&self) -> Result<AuthenticationOptions> {
        let prf_salts = self
            .credentials
            .lock()
            .unwrap()
            .iter()
            .map(|c| CredentialSalt {
                credential_id: c.public.id.clone(),
                salt: c.salt.clone(),
            })
            .collect();
        Ok(AuthenticationOptions {
            options: serde_json::json!({}),
            prf_salts,
        })
    }

    async fn verify_authentication(
        &self,
        credential_id: &str,
        _assertion: &serde_json::Value,
    ) -> Result<VerifiedAuthentication> {
        let mut credentials = self.credentials.lock().unwrap();
        let credential = credentials
            .iter_mut()
            .find(|c| c.public.id == credential_id)
            .ok_or_else(|| VaultCoreError::Authenticator("unknown credential".into()))?;
        credential.public.last_used_at = Some(Utc::now());
        Ok(VerifiedAuthentication {
            credential_id: credential_id.to_string(),
            wrapped_key: credential.wrapped_key.clone(),
        })
    }

    async fn list_credentials(&self) -> Result<Vec<PasskeyCredential>> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.public.clone())
            .collect())
    }

    async fn delete_credential(&self, credential_id: &str) -> Result<()> {
        self.credentials
            .lock()
            .unwrap()
            .retain(|c| c.public.id != credential_id);
        Ok(())
    }

    async fn save_wrapped_key(&self, credential_id: &str, wrapped_key: &str) -> Result<()> {
        let mut credentials = self.credentials.lock().unwrap();
        let credential = credentials
            .iter_mut()
            .find(|c| c.public.id == credential_id)
            .ok_or_else(|| VaultCoreError::Authenticator("unknown credential".into()))?;
        credential.wrapped_key = Some(wrapped_key.to_string());
        credential.public.wrap_status = WrapStatus::Wrapped;
        Ok(())
    }
}

/// How the fake authenticator behaves on the next ceremonies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticatorBehavior {
    /// Returns PRF output for both ceremonies.
    Prf,
    /// Returns PRF output only during authentication.
    PrfOnAuthenticationOnly,
    /// Never returns PRF output.
    NoPrf,
    /// The user dismisses the prompt.
    Cancel,
}

/// Authenticator double holding one device secret; PRF output is
/// HMAC-like mixing of that secret with the salt.
pub struct FakeAuthenticator {
    device_secret: [u8; 32],
    behavior: Mutex<AuthenticatorBehavior>,
    credential_id: String,
}

impl FakeAuthenticator {
    pub fn new(credential_id: &str, behavior: AuthenticatorBehavior) -> Self {
        Self {
            device_secret: [0x5a; 32],
            behavior: Mutex::new(behavior),
            credential_id: credential_id.to_string(),
        }
    }

    pub fn set_behavior(&self, behavior: AuthenticatorBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    fn prf(&self, salt: &[u8]) -> Zeroizing<Vec<u8>> {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.device_secret);
        hasher.update(salt);
        Zeroizing::new(hasher.finalize().to_vec())
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn register(
        &self,
        options: &RegistrationOptions,
    ) -> Result<Ceremony<RegistrationResponse>> {
        let behavior = *self.behavior.lock().unwrap();
        if behavior == AuthenticatorBehavior::Cancel {
            return Ok(Ceremony::Cancelled);
        }
        let prf_output = (behavior == AuthenticatorBehavior::Prf).then(|| self.prf(&options.prf_salt));
        Ok(Ceremony::Completed(RegistrationResponse {
            credential_id: self.credential_id.clone(),
            attestation: serde_json::json!({ "fmt": "none" }),
            prf_output,
        }))
    }

    async fn authenticate(
        &self,
        options: &AuthenticationOptions,
    ) -> Result<Ceremony<AuthenticationResponse>> {
        let behavior = *self.behavior.lock().unwrap();
        if behavior == AuthenticatorBehavior::Cancel {
            return Ok(Ceremony::Cancelled);
        }
        let salt = options
            .prf_salts
            .iter()
            .find(|s| s.credential_id == self.credential_id)
            .map(|s| s.salt.clone());
        let prf_output = match (behavior, salt) {
            (AuthenticatorBehavior::NoPrf, _) | (_, None) => None,
            (_, Some(salt)) => Some(self.prf(&salt)),
        };
        Ok(Ceremony::Completed(AuthenticationResponse {
            credential_id: self.credential_id.clone(),
            assertion: serde_json::json!({ "signature": "ok" }),
            prf_output,
        }))
    }
}
