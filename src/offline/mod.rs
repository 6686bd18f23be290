//! Offline-first cache and write queue.
//!
//! While disconnected the local snapshot is the source of truth and every
//! write lands in an ordered, durable queue. Once connectivity returns the
//! queue is replayed against the remote store in creation order.

pub mod models;
pub mod sync;

pub use models::{
    LoadedSnapshot, Mutation, MutationQueueEntry, OfflineSnapshot, RecordRef, SnapshotSource,
    SyncReport,
};
pub use sync::{OfflineSync, WriteOutcome, DEFAULT_MAX_ATTEMPTS};
