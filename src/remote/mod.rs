//! Collaborator contracts for the remote store and the connectivity signal.
//!
//! Adapters implementing these traits are the normalization boundary:
//! they report network failures as `VaultCoreError::ConnectivityUnavailable`
//! and unique-constraint violations on insert as
//! `VaultCoreError::StorageConflict`. Nothing inside this crate inspects
//! error text to classify a failure.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::hybrid::StoredKeyPair;
use crate::errors::Result;
use crate::vault::item::{CategoryRow, VaultItemRow};

/// Authoritative vault contents as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVaultState {
    pub vault_id: String,
    pub items: Vec<VaultItemRow>,
    pub categories: Vec<CategoryRow>,
}

/// The remote relational store, seen through the operations the core needs.
#[async_trait]
pub trait RemoteVault: Send + Sync {
    /// Fetch every item and category of the user's default vault.
    async fn fetch_vault(&self, user_id: &str) -> Result<RemoteVaultState>;

    /// Id of the user's default vault, if one exists.
    async fn default_vault_id(&self, user_id: &str) -> Result<Option<String>>;

    /// Insert or merge on conflict by id.
    async fn upsert_item(&self, row: &VaultItemRow) -> Result<()>;

    /// Deleting an id that does not exist succeeds.
    async fn delete_item(&self, id: &str) -> Result<()>;

    async fn upsert_category(&self, row: &CategoryRow) -> Result<()>;

    async fn delete_category(&self, id: &str) -> Result<()>;

    async fn fetch_key_pair(&self, user_id: &str) -> Result<Option<StoredKeyPair>>;

    /// Insert only if no row exists for `user_id`.
    ///
    /// Must fail with `StorageConflict` when another writer got there first.
    async fn insert_key_pair(&self, user_id: &str, pair: &StoredKeyPair) -> Result<()>;
}

/// "Is the device online" oracle.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// A connectivity flag that can be flipped at runtime.
#[derive(Debug)]
pub struct ConnectivityFlag(AtomicBool);

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
