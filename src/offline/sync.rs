//! Snapshot routing and mutation replay.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::models::{
    LoadedSnapshot, Mutation, MutationQueueEntry, OfflineSnapshot, SnapshotSource, SyncReport,
};
use crate::config::Settings;
use crate::errors::Result;
use crate::remote::{Connectivity, RemoteVault};
use crate::storage::OfflineStore;
use crate::vault::item::{CategoryRow, VaultItemRow};

/// Replays before an entry that keeps failing is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// How `write_mutation` disposed of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The remote store accepted the write.
    Applied,
    /// The write was queued for later replay; carries the entry id.
    Queued(String),
}

/// Offline-first view of one device's vault cache.
///
/// Every snapshot read-modify-write goes through `snapshot_lock`, so two
/// tasks in this process never interleave their updates to the same cache.
/// Separate processes sharing one cache are not coordinated; the last
/// whole-snapshot write wins.
pub struct OfflineSync {
    remote: Arc<dyn RemoteVault>,
    store: Arc<dyn OfflineStore>,
    connectivity: Arc<dyn Connectivity>,
    max_attempts: u32,
    snapshot_lock: Mutex<()>,
}

impl OfflineSync {
    pub fn new(
        remote: Arc<dyn RemoteVault>,
        store: Arc<dyn OfflineStore>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            remote,
            store,
            connectivity,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            snapshot_lock: Mutex::new(()),
        }
    }

    /// An engine whose dead-letter bound comes from `settings`.
    pub fn from_settings(
        remote: Arc<dyn RemoteVault>,
        store: Arc<dyn OfflineStore>,
        connectivity: Arc<dyn Connectivity>,
        settings: &Settings,
    ) -> Self {
        Self::new(remote, store, connectivity).with_max_attempts(settings.sync_max_attempts)
    }

    /// Override the dead-letter bound. Values below 1 are treated as 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    // ------------------------------------------------------------------
    // Snapshot loading
    // ------------------------------------------------------------------

    /// Load the user's vault, preferring the remote store when online.
    ///
    /// Returns `None` only when offline with nothing cached.
    pub async fn load_vault_snapshot(&self, user_id: &str) -> Result<Option<LoadedSnapshot>> {
        if self.connectivity.is_online() {
            match self.refresh_from_remote(user_id).await {
                Ok(snapshot) => {
                    debug!(%user_id, items = snapshot.items.len(), "snapshot loaded from remote");
                    return Ok(Some(LoadedSnapshot {
                        snapshot,
                        source: SnapshotSource::Remote,
                    }));
                }
                Err(e) if e.is_connectivity() => {
                    debug!(%user_id, "remote unreachable, falling back to cache");
                }
                Err(e) => return Err(e),
            }
        }

        let cached = self.store.load_snapshot(user_id).await?;
        if cached.is_some() {
            debug!(%user_id, "snapshot loaded from cache");
        }
        Ok(cached.map(|snapshot| LoadedSnapshot {
            snapshot,
            source: SnapshotSource::Cache,
        }))
    }

    /// Fetch remote state, lay pending local writes over it, and cache it.
    ///
    /// Queued mutations are re-applied so a refresh never hides a write the
    /// remote store has not seen yet.
    async fn refresh_from_remote(&self, user_id: &str) -> Result<OfflineSnapshot> {
        let state = self.remote.fetch_vault(user_id).await?;

        let _guard = self.snapshot_lock.lock().await;
        let now = Utc::now();
        let mut snapshot = OfflineSnapshot {
            user_id: user_id.to_string(),
            vault_id: state.vault_id,
            items: state.items,
            categories: state.categories,
            last_synced_at: Some(now),
            updated_at: now,
        };
        for entry in self.store.list_mutations(user_id).await? {
            snapshot.apply(&entry.mutation);
        }
        self.store.save_snapshot(&snapshot).await?;
        Ok(snapshot)
    }

    /// The user's default vault id.
    ///
    /// Offline this reads only the cache. Online it asks the remote store
    /// first and backfills the cache with the answer.
    pub async fn resolve_default_vault_id(&self, user_id: &str) -> Result<Option<String>> {
        if !self.connectivity.is_online() {
            return self.cached_vault_id(user_id).await;
        }

        match self.remote.default_vault_id(user_id).await {
            Ok(Some(vault_id)) => {
                self.backfill_vault_id(user_id, &vault_id).await?;
                Ok(Some(vault_id))
            }
            Ok(None) => self.cached_vault_id(user_id).await,
            Err(e) if e.is_connectivity() => self.cached_vault_id(user_id).await,
            Err(e) => Err(e),
        }
    }

    async fn cached_vault_id(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .load_snapshot(user_id)
            .await?
            .map(|snapshot| snapshot.vault_id))
    }

    async fn backfill_vault_id(&self, user_id: &str, vault_id: &str) -> Result<()> {
        let _guard = self.snapshot_lock.lock().await;
        match self.store.load_snapshot(user_id).await? {
            Some(snapshot) if snapshot.vault_id == vault_id => Ok(()),
            Some(mut snapshot) => {
                snapshot.vault_id = vault_id.to_string();
                snapshot.updated_at = Utc::now();
                self.store.save_snapshot(&snapshot).await
            }
            None => {
                self.store
                    .save_snapshot(&OfflineSnapshot::empty(user_id, vault_id))
                    .await
            }
        }
    }

    // ------------------------------------------------------------------
    // Local snapshot mutators
    // ------------------------------------------------------------------

    pub async fn upsert_offline_item_row(&self, user_id: &str, row: VaultItemRow) -> Result<()> {
        let vault_id = row.vault_id.clone();
        self.modify_snapshot(user_id, &vault_id, |s| s.upsert_item(row))
            .await
    }

    pub async fn remove_offline_item_row(&self, user_id: &str, id: &str) -> Result<()> {
        self.modify_existing_snapshot(user_id, |s| s.remove_item(id))
            .await
    }

    pub async fn upsert_offline_category_row(
        &self,
        user_id: &str,
        row: CategoryRow,
    ) -> Result<()> {
        let vault_id = row.vault_id.clone();
        self.modify_snapshot(user_id, &vault_id, |s| s.upsert_category(row))
            .await
    }

    pub async fn remove_offline_category_row(&self, user_id: &str, id: &str) -> Result<()> {
        self.modify_existing_snapshot(user_id, |s| s.remove_category(id))
            .await
    }

    /// Apply `f` to the cached snapshot, creating an empty one if needed.
    async fn modify_snapshot<F>(&self, user_id: &str, vault_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut OfflineSnapshot),
    {
        let _guard = self.snapshot_lock.lock().await;
        let mut snapshot = self
            .store
            .load_snapshot(user_id)
            .await?
            .unwrap_or_else(|| OfflineSnapshot::empty(user_id, vault_id));
        f(&mut snapshot);
        self.store.save_snapshot(&snapshot).await
    }

    /// Apply `f` to the cached snapshot; a missing snapshot is left alone.
    async fn modify_existing_snapshot<F>(&self, user_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut OfflineSnapshot),
    {
        let _guard = self.snapshot_lock.lock().await;
        let Some(mut snapshot) = self.store.load_snapshot(user_id).await? else {
            return Ok(());
        };
        f(&mut snapshot);
        self.store.save_snapshot(&snapshot).await
    }

    // ------------------------------------------------------------------
    // Mutation queue
    // ------------------------------------------------------------------

    /// Durably record a pending write. Returns the entry id.
    pub async fn enqueue_offline_mutation(
        &self,
        user_id: &str,
        mutation: Mutation,
    ) -> Result<String> {
        let entry = MutationQueueEntry::new(user_id, mutation);
        self.store.enqueue_mutation(&entry).await?;
        debug!(%user_id, entry_id = %entry.id, "mutation queued");
        Ok(entry.id)
    }

    /// Pending writes for `user_id`, oldest first.
    pub async fn get_offline_mutations(&self, user_id: &str) -> Result<Vec<MutationQueueEntry>> {
        self.store.list_mutations(user_id).await
    }

    pub async fn remove_offline_mutations(&self, ids: &[String]) -> Result<()> {
        self.store.remove_mutations(ids).await
    }

    /// Apply a write locally, then push it remotely or queue it.
    ///
    /// If earlier writes are still queued, this one is queued behind them
    /// so replay order matches the order writes were made. A push the
    /// remote store rejects is queued too, with the rejection recorded in
    /// `last_error`; replay then retries it and eventually dead-letters it,
    /// and the refresh after that run drops the local row again.
    pub async fn write_mutation(&self, user_id: &str, mutation: Mutation) -> Result<WriteOutcome> {
        let vault_id = match &mutation {
            Mutation::UpsertItem(row) => Some(row.vault_id.clone()),
            Mutation::UpsertCategory(row) => Some(row.vault_id.clone()),
            Mutation::DeleteItem { .. } | Mutation::DeleteCategory { .. } => None,
        };
        match vault_id {
            Some(vault_id) => {
                self.modify_snapshot(user_id, &vault_id, |s| s.apply(&mutation))
                    .await?
            }
            None => {
                self.modify_existing_snapshot(user_id, |s| s.apply(&mutation))
                    .await?
            }
        }

        let mut entry = MutationQueueEntry::new(user_id, mutation);
        let backlog = !self.store.list_mutations(user_id).await?.is_empty();
        if self.connectivity.is_online() && !backlog {
            match self.push(&entry.mutation).await {
                Ok(()) => return Ok(WriteOutcome::Applied),
                Err(e) if e.is_connectivity() => {
                    debug!(%user_id, "remote unreachable, queueing write");
                }
                Err(e) => {
                    warn!(
                        %user_id,
                        entry_id = %entry.id,
                        error = %e,
                        "write rejected, queueing for retry"
                    );
                    entry.last_error = Some(e.to_string());
                }
            }
        }

        self.store.enqueue_mutation(&entry).await?;
        debug!(%user_id, entry_id = %entry.id, "mutation queued");
        Ok(WriteOutcome::Queued(entry.id))
    }

    /// Replay queued writes against the remote store, oldest first.
    ///
    /// Replay is strictly sequential. A connectivity failure stops the run
    /// and leaves that entry and everything after it queued. Any other
    /// failure is counted and recorded on the entry, and every later entry
    /// for the same record is held back until a later run, so one record's
    /// writes never reach the remote store out of order. Entries for other
    /// records carry on. An entry that has failed `max_attempts` times is
    /// removed and returned in `dead_lettered`, which releases the record. After an uninterrupted run the cached snapshot
    /// is refreshed from the remote store.
    pub async fn sync_offline_mutations(&self, user_id: &str) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        if !self.connectivity.is_online() {
            report.remaining = self.store.list_mutations(user_id).await?.len();
            report.interrupted = true;
            return Ok(report);
        }

        let entries = self.store.list_mutations(user_id).await?;
        if !entries.is_empty() {
            info!(%user_id, pending = entries.len(), "replaying offline mutations");
        }

        let mut blocked = HashSet::new();
        for mut entry in entries {
            if !self.connectivity.is_online() {
                report.interrupted = true;
                break;
            }

            let target = entry.mutation.target();
            if blocked.contains(&target) {
                debug!(
                    %user_id,
                    entry_id = %entry.id,
                    "held behind a failed write to the same record"
                );
                report.deferred += 1;
                continue;
            }

            match self.push(&entry.mutation).await {
                Ok(()) => {
                    self.store
                        .remove_mutations(std::slice::from_ref(&entry.id))
                        .await?;
                    report.processed += 1;
                }
                Err(e) if e.is_connectivity() => {
                    debug!(%user_id, entry_id = %entry.id, "replay interrupted by connectivity loss");
                    report.interrupted = true;
                    break;
                }
                Err(e) => {
                    report.errors += 1;
                    entry.attempts += 1;
                    entry.last_error = Some(e.to_string());

                    if entry.attempts >= self.max_attempts {
                        warn!(
                            %user_id,
                            entry_id = %entry.id,
                            attempts = entry.attempts,
                            error = %e,
                            "dropping mutation after repeated failures"
                        );
                        self.store
                            .remove_mutations(std::slice::from_ref(&entry.id))
                            .await?;
                        report.dead_lettered.push(entry);
                    } else {
                        warn!(
                            %user_id,
                            entry_id = %entry.id,
                            attempts = entry.attempts,
                            error = %e,
                            "mutation replay failed"
                        );
                        self.store.update_mutation(&entry).await?;
                        blocked.insert(target);
                    }
                }
            }
        }

        if !report.interrupted {
            match self.refresh_from_remote(user_id).await {
                Ok(_) => {}
                Err(e) if e.is_connectivity() => report.interrupted = true,
                Err(e) => warn!(%user_id, error = %e, "snapshot refresh after sync failed"),
            }
        }

        report.remaining = self.store.list_mutations(user_id).await?.len();
        info!(
            %user_id,
            processed = report.processed,
            errors = report.errors,
            remaining = report.remaining,
            "offline sync finished"
        );
        Ok(report)
    }

    async fn push(&self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::UpsertItem(row) => self.remote.upsert_item(row).await,
            Mutation::DeleteItem { id } => self.remote.delete_item(id).await,
            Mutation::UpsertCategory(row) => self.remote.upsert_category(row).await,
            Mutation::DeleteCategory { id } => self.remote.delete_category(id).await,
        }
    }
}
