//! Key-value store backed by SQLite.
//! One row per named item; survives across reading sessions.

use std::path::Path;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{KeyValueStore, StoreError};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;

        // Autosave writes must not block a concurrent load.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::init(conn)?;

        info!(path = %db_path.display(), "SQLite store opened");
        Ok(store)
    }

    /// Store living only as long as this value.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn get_sync(&self, name: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_sync(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (name, value, updated_at)
             VALUES (?1, ?2, CAST(strftime('%s', 'now') AS INTEGER))",
            params![name, value],
        )?;
        debug!(item = name, bytes = value.len(), "store item written");
        Ok(())
    }

    fn remove_sync(&self, name: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv_store WHERE name = ?1", params![name])?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get_item<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move { self.get_sync(name) })
    }

    fn set_item<'a>(&'a self, name: &'a str, value: String) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { self.set_sync(name, &value) })
    }

    fn remove_item<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { self.remove_sync(name) })
    }
}
