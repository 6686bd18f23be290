//! Offline snapshot and mutation queue records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vault::item::{CategoryRow, VaultItemRow};

/// The local source of truth while disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineSnapshot {
    pub user_id: String,
    pub vault_id: String,
    pub items: Vec<VaultItemRow>,
    pub categories: Vec<CategoryRow>,
    /// Last time this snapshot was refreshed from the remote store.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OfflineSnapshot {
    /// An empty snapshot for `vault_id`, never synced.
    pub fn empty(user_id: &str, vault_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            vault_id: vault_id.to_string(),
            items: Vec::new(),
            categories: Vec::new(),
            last_synced_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Insert or replace by id, keeping the original `created_at`.
    pub fn upsert_item(&mut self, mut row: VaultItemRow) {
        match self.items.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => {
                row.created_at = existing.created_at;
                *existing = row;
            }
            None => self.items.push(row),
        }
        self.updated_at = Utc::now();
    }

    pub fn remove_item(&mut self, id: &str) {
        self.items.retain(|r| r.id != id);
        self.updated_at = Utc::now();
    }

    /// Insert or replace by id, keeping the original `created_at`.
    pub fn upsert_category(&mut self, mut row: CategoryRow) {
        match self.categories.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => {
                row.created_at = existing.created_at;
                *existing = row;
            }
            None => self.categories.push(row),
        }
        self.updated_at = Utc::now();
    }

    pub fn remove_category(&mut self, id: &str) {
        self.categories.retain(|r| r.id != id);
        self.updated_at = Utc::now();
    }

    /// Apply a queued write to this snapshot.
    pub fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::UpsertItem(row) => self.upsert_item(row.clone()),
            Mutation::DeleteItem { id } => self.remove_item(id),
            Mutation::UpsertCategory(row) => self.upsert_category(row.clone()),
            Mutation::DeleteCategory { id } => self.remove_category(id),
        }
    }
}

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Remote,
    Cache,
}

/// A snapshot together with its source.
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub snapshot: OfflineSnapshot,
    pub source: SnapshotSource,
}

/// A write made while disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Mutation {
    UpsertItem(VaultItemRow),
    DeleteItem { id: String },
    UpsertCategory(CategoryRow),
    DeleteCategory { id: String },
}

/// The record a mutation writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordRef {
    Item(String),
    Category(String),
}

impl Mutation {
    pub fn target(&self) -> RecordRef {
        match self {
            Self::UpsertItem(row) => RecordRef::Item(row.id.clone()),
            Self::DeleteItem { id } => RecordRef::Item(id.clone()),
            Self::UpsertCategory(row) => RecordRef::Category(row.id.clone()),
            Self::DeleteCategory { id } => RecordRef::Category(id.clone()),
        }
    }
}

/// One durable entry of the mutation queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationQueueEntry {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub mutation: Mutation,
    /// Failed replays that were not connectivity-related.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl MutationQueueEntry {
    /// A new entry stamped with a fresh id and the current time.
    pub fn new(user_id: &str, mutation: Mutation) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            mutation,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Outcome of `sync_offline_mutations`.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Entries applied remotely and removed from the queue.
    pub processed: usize,
    /// Non-connectivity failures during this run.
    pub errors: usize,
    /// Entries still queued after this run.
    pub remaining: usize,
    /// Entries held back this run because an earlier write to the same
    /// record failed.
    pub deferred: usize,
    /// Entries dropped after exhausting their attempts.
    pub dead_lettered: Vec<MutationQueueEntry>,
    /// Replay stopped early because the device went offline.
    pub interrupted: bool,
}
