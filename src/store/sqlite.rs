//! SQLite-backed key-value store.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

use super::KeyValueStore;
use crate::error::StoreError;

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Key-value store persisted in a single SQLite table.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Access(format!(
          "failed to create store directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    Self::from_connection(Connection::open(path)?)
  }

  /// Open a store that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(KV_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Access(format!("lock poisoned: {}", e)))
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Option<String> {
    let result = self.lock().and_then(|conn| {
      conn
        .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
          row.get(0)
        })
        .optional()
        .map_err(StoreError::from)
    });

    match result {
      Ok(value) => value,
      Err(e) => {
        warn!(key, error = %e, "store read failed, treating key as absent");
        None
      }
    }
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM kv WHERE key = ?", params![key])?;
    Ok(())
  }
}
