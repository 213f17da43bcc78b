//! Scoped key-value storage for ledger snapshots.
//!
//! Snapshots live under a key derived from the identity token, so two
//! identities on the same device never read each other's orders. The raw
//! token never reaches the store: the key carries its md5 digest.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::db::{self, DbState};
use crate::error::StoreError;

const KEY_PREFIX: &str = "waiterOrders_";

/// Store key for the ledger owned by `token`.
pub fn storage_key(token: &str) -> String {
    format!("{KEY_PREFIX}{:x}", md5::compute(token.trim().as_bytes()))
}

/// Asynchronous key-value store the session persists into.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Get the value for a key. Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite a key.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a key. Silently succeeds if the key does not exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Store backed by the `ledger_snapshots` table.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<DbState>,
}

impl SqliteStore {
    pub fn new(db: Arc<DbState>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.db.conn.lock().map_err(|_| StoreError::Lock)?;
        db::get_snapshot(&conn, key)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.db.conn.lock().map_err(|_| StoreError::Lock)?;
        db::put_snapshot(&conn, key, value)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.db.conn.lock().map_err(|_| StoreError::Lock)?;
        db::delete_snapshot(&conn, key)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Lock)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Lock)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Lock)?;
        entries.remove(key);
        Ok(())
    }
}
