//! SQLite-backed local cache.
//!
//! Snapshots, queue entries and integrity roots are stored as JSON values
//! keyed by user. Every write is a single statement (or one transaction),
//! so a concurrent reader never observes a half-applied change.
//!
//! `rusqlite` is synchronous; each call runs on tokio's blocking pool so
//! disk I/O never stalls a runtime worker.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{IntegrityRootStore, OfflineStore};
use crate::errors::{Result, VaultCoreError};
use crate::integrity::IntegrityRoot;
use crate::offline::models::{MutationQueueEntry, OfflineSnapshot};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS offline_snapshots (
        user_id     TEXT PRIMARY KEY,
        data        TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS mutation_queue (
        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
        id          TEXT NOT NULL UNIQUE,
        user_id     TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        data        TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS mutation_queue_user
        ON mutation_queue (user_id, created_at, seq);
    CREATE TABLE IF NOT EXISTS integrity_roots (
        user_id     TEXT PRIMARY KEY,
        data        TEXT NOT NULL
    );";

/// Durable on-device store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err("open"))?;
        let store = Self::with_connection(conn)?;

        // Restrict the cache to its owner.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(store)
    }

    /// A private in-memory database, gone when dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err("open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(storage_err("schema"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| VaultCoreError::Storage("cache connection poisoned".into()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| VaultCoreError::Storage(format!("cache task failed: {e}")))?
    }
}

fn storage_err(context: &'static str) -> impl Fn(rusqlite::Error) -> VaultCoreError {
    move |e| VaultCoreError::Storage(format!("{context}: {e}"))
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| VaultCoreError::Serialization(e.to_string()))
}

fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| VaultCoreError::Storage(format!("corrupt cache row: {e}")))
}

fn load_json<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    user_id: &str,
    context: &'static str,
) -> Result<Option<T>> {
    let data: Option<String> = conn
        .query_row(sql, params![user_id], |row| row.get(0))
        .optional()
        .map_err(storage_err(context))?;
    data.as_deref().map(from_json).transpose()
}

#[async_trait]
impl OfflineStore for SqliteStore {
    async fn load_snapshot(&self, user_id: &str) -> Result<Option<OfflineSnapshot>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            load_json(
                conn,
                "SELECT data FROM offline_snapshots WHERE user_id = ?1",
                &user_id,
                "load snapshot",
            )
        })
        .await
    }

    async fn save_snapshot(&self, snapshot: &OfflineSnapshot) -> Result<()> {
        let data = to_json(snapshot)?;
        let user_id = snapshot.user_id.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO offline_snapshots (user_id, data) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET data = excluded.data",
                params![user_id, data],
            )
            .map_err(storage_err("save snapshot"))?;
            Ok(())
        })
        .await
    }

    async fn enqueue_mutation(&self, entry: &MutationQueueEntry) -> Result<()> {
        let data = to_json(entry)?;
        let created_at = entry
            .created_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let id = entry.id.clone();
        let user_id = entry.user_id.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO mutation_queue (id, user_id, created_at, data) VALUES (?1, ?2, ?3, ?4)",
                params![id, user_id, created_at, data],
            )
            .map_err(storage_err("enqueue mutation"))?;
            Ok(())
        })
        .await
    }

    async fn list_mutations(&self, user_id: &str) -> Result<Vec<MutationQueueEntry>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT data FROM mutation_queue
                     WHERE user_id = ?1
                     ORDER BY created_at ASC, seq ASC",
                )
                .map_err(storage_err("list prepare"))?;

            let rows = stmt
                .query_map(params![user_id], |row| row.get::<_, String>(0))
                .map_err(storage_err("list exec"))?;

            let mut entries = Vec::new();
            for row in rows {
                let data = row.map_err(storage_err("list row"))?;
                entries.push(from_json(&data)?);
            }
            Ok(entries)
        })
        .await
    }

    async fn update_mutation(&self, entry: &MutationQueueEntry) -> Result<()> {
        let data = to_json(entry)?;
        let id = entry.id.clone();
        self.run(move |conn| {
            conn.execute(
                "UPDATE mutation_queue SET data = ?1 WHERE id = ?2",
                params![data, id],
            )
            .map_err(storage_err("update mutation"))?;
            Ok(())
        })
        .await
    }

    async fn remove_mutations(&self, ids: &[String]) -> Result<()> {
        let ids = ids.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction().map_err(storage_err("remove begin"))?;
            for id in &ids {
                tx.execute("DELETE FROM mutation_queue WHERE id = ?1", params![id])
                    .map_err(storage_err("remove mutation"))?;
            }
            tx.commit().map_err(storage_err("remove commit"))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl IntegrityRootStore for SqliteStore {
    async fn load_root(&self, user_id: &str) -> Result<Option<IntegrityRoot>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            load_json(
                conn,
                "SELECT data FROM integrity_roots WHERE user_id = ?1",
                &user_id,
                "load root",
            )
        })
        .await
    }

    async fn save_root(&self, root: &IntegrityRoot) -> Result<()> {
        let data = to_json(root)?;
        let user_id = root.user_id.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO integrity_roots (user_id, data) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET data = excluded.data",
                params![user_id, data],
            )
            .map_err(storage_err("save root"))?;
            Ok(())
        })
        .await
    }

    async fn delete_root(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM integrity_roots WHERE user_id = ?1",
                params![user_id],
            )
            .map_err(storage_err("delete root"))?;
            Ok(())
        })
        .await
    }
}
