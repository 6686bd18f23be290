//! Local persistence for the offline engine and the integrity verifier.
//!
//! Only ciphertext, digests and metadata cross this boundary; key material
//! never does. Each write replaces a whole value in one step so a reader
//! sees either the previous or the new state.
//!
//! Two backends are provided:
//! - `MemoryStore` for tests and ephemeral sessions (`memory`)
//! - `SqliteStore` for durable on-device storage (`sqlite`, feature
//!   `sqlite-store`)

pub mod memory;
#[cfg(feature = "sqlite-store")]
pub mod sqlite;

use async_trait::async_trait;

use crate::errors::Result;
use crate::integrity::IntegrityRoot;
use crate::offline::models::{MutationQueueEntry, OfflineSnapshot};

pub use memory::MemoryStore;
#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteStore;

/// Snapshot cache and mutation queue.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    async fn load_snapshot(&self, user_id: &str) -> Result<Option<OfflineSnapshot>>;

    /// Replace the user's snapshot.
    async fn save_snapshot(&self, snapshot: &OfflineSnapshot) -> Result<()>;

    async fn enqueue_mutation(&self, entry: &MutationQueueEntry) -> Result<()>;

    /// Entries for `user_id`, oldest first. Ties keep insertion order.
    async fn list_mutations(&self, user_id: &str) -> Result<Vec<MutationQueueEntry>>;

    /// Persist a changed `attempts` / `last_error` for an existing entry.
    async fn update_mutation(&self, entry: &MutationQueueEntry) -> Result<()>;

    /// Unknown ids are ignored.
    async fn remove_mutations(&self, ids: &[String]) -> Result<()>;
}

/// Per-user tamper-evidence baselines.
#[async_trait]
pub trait IntegrityRootStore: Send + Sync {
    async fn load_root(&self, user_id: &str) -> Result<Option<IntegrityRoot>>;

    async fn save_root(&self, root: &IntegrityRoot) -> Result<()>;

    async fn delete_root(&self, user_id: &str) -> Result<()>;
}
