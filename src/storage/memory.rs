use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{IntegrityRootStore, OfflineStore};
use crate::errors::Result;
use crate::integrity::IntegrityRoot;
use crate::offline::models::{MutationQueueEntry, OfflineSnapshot};

#[derive(Debug, Default)]
struct Inner {
    snapshots: HashMap<String, OfflineSnapshot>,
    queue: Vec<MutationQueueEntry>,
    roots: HashMap<String, IntegrityRoot>,
}

/// In-memory store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineStore for MemoryStore {
    async fn load_snapshot(&self, user_id: &str) -> Result<Option<OfflineSnapshot>> {
        Ok(self.inner.lock().await.snapshots.get(user_id).cloned())
    }

    async fn save_snapshot(&self, snapshot: &OfflineSnapshot) -> Result<()> {
        self.inner
            .lock()
            .await
            .snapshots
            .insert(snapshot.user_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn enqueue_mutation(&self, entry: &MutationQueueEntry) -> Result<()> {
        self.inner.lock().await.queue.push(entry.clone());
        Ok(())
    }

    async fn list_mutations(&self, user_id: &str) -> Result<Vec<MutationQueueEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<MutationQueueEntry> = inner
            .queue
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn update_mutation(&self, entry: &MutationQueueEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.queue.iter_mut().find(|e| e.id == entry.id) {
            existing.attempts = entry.attempts;
            existing.last_error = entry.last_error.clone();
        }
        Ok(())
    }

    async fn remove_mutations(&self, ids: &[String]) -> Result<()> {
        self.inner
            .lock()
            .await
            .queue
            .retain(|e| !ids.contains(&e.id));
        Ok(())
    }
}

#[async_trait]
impl IntegrityRootStore for MemoryStore {
    async fn load_root(&self, user_id: &str) -> Result<Option<IntegrityRoot>> {
        Ok(self.inner.lock().await.roots.get(user_id).cloned())
    }

    async fn save_root(&self, root: &IntegrityRoot) -> Result<()> {
        self.inner
            .lock()
            .await
            .roots
            .insert(root.user_id.clone(), root.clone());
        Ok(())
    }

    async fn delete_root(&self, user_id: &str) -> Result<()> {
        self.inner.lock().await.roots.remove(user_id);
        Ok(())
    }
}
