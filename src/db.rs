//! Local SQLite database for ledger snapshots.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations and the
//! snapshot read/write helpers behind the SQLite [`PersistentStore`].
//!
//! [`PersistentStore`]: crate::storage::PersistentStore

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::StoreError;

/// Database handle shared by the SQLite store.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

const DB_FILE_NAME: &str = "waiter.db";

/// Initialize the database at `{data_dir}/waiter.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, StoreError> {
    fs::create_dir_all(data_dir)
        .map_err(|e| StoreError::Storage(format!("Failed to create data dir: {e}")))?;

    let db_path = data_dir.join(DB_FILE_NAME);
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path).map_err(|e| {
                StoreError::Storage(format!("Database open failed after retry: {e}"))
            })?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open an in-memory database with the full schema.
#[cfg(test)]
pub fn open_in_memory() -> Result<DbState, StoreError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| StoreError::Storage(format!("pragma setup: {e}")))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| StoreError::Storage(format!("create schema_version: {e}")))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// v1: key/value snapshot table.
fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS ledger_snapshots (
            storage_key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
         );
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )
    .map_err(|e| StoreError::Storage(format!("migration v1: {e}")))
}

/// v2: index for pruning stale snapshots by age.
fn migrate_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "BEGIN;
         CREATE INDEX IF NOT EXISTS idx_ledger_snapshots_updated_at
            ON ledger_snapshots (updated_at);
         INSERT INTO schema_version (version) VALUES (2);
         COMMIT;",
    )
    .map_err(|e| StoreError::Storage(format!("migration v2: {e}")))
}

// ---------------------------------------------------------------------------
// Snapshot helpers
// ---------------------------------------------------------------------------

/// Read the snapshot stored under `key`.
pub fn get_snapshot(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let data = conn
        .query_row(
            "SELECT data FROM ledger_snapshots WHERE storage_key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(data)
}

/// Insert or replace the snapshot under `key`.
pub fn put_snapshot(conn: &Connection, key: &str, data: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO ledger_snapshots (storage_key, data, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(storage_key) DO UPDATE SET
            data = excluded.data,
            updated_at = excluded.updated_at",
        params![key, data, chrono::Utc::now().to_rfc3339()],
    )
    .map_err(|e| StoreError::Storage(format!("put_snapshot: {e}")))?;
    Ok(())
}

pub fn delete_snapshot(conn: &Connection, key: &str) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM ledger_snapshots WHERE storage_key = ?1",
        params![key],
    )?;
    Ok(())
}

/// Delete snapshots not written since `cutoff` (RFC 3339). Returns the number removed.
pub fn prune_snapshots_before(conn: &Connection, cutoff: &str) -> Result<usize, StoreError> {
    let removed = conn.execute(
        "DELETE FROM ledger_snapshots WHERE updated_at < ?1",
        params![cutoff],
    )?;
    if removed > 0 {
        info!(removed, "Pruned stale ledger snapshots");
    }
    Ok(removed)
}

// ===========================================================================
// Tests
// ===========================================================================
