//! SQLite implementation of cache generation storage.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheEntry, CacheStorage, RequestKey};
use crate::error::StoreError;
use crate::http::{Response, ResponseType};

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per generation, so empty generations still exist
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots, keyed by sha256 of "<METHOD> <URL>"
CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    request TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    response_type TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_hash)
);
"#;

/// SQLite-based cache storage.
pub struct SqliteCacheStorage {
  conn: Mutex<Connection>,
}

impl SqliteCacheStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Access(format!(
          "failed to create cache directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    Self::from_connection(Connection::open(path)?)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Access(format!("lock poisoned: {}", e)))
  }
}

fn ensure_generation(tx: &Transaction<'_>, generation: &str) -> Result<(), StoreError> {
  tx.execute(
    "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
    params![generation],
  )?;
  Ok(())
}

fn insert_entry(
  tx: &Transaction<'_>,
  generation: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<(), StoreError> {
  let headers = serde_json::to_string(&response.headers)?;
  tx.execute(
    "INSERT OR REPLACE INTO cache_entries
       (generation, request_hash, request, status, status_text, headers, body, response_type, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      generation,
      key.cache_hash(),
      key.description(),
      response.status,
      response.status_text,
      headers,
      response.body,
      response.kind.as_str(),
    ],
  )?;
  Ok(())
}

impl CacheStorage for SqliteCacheStorage {
  fn generations(&self) -> Result<Vec<String>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM cache_generations ORDER BY name")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>, StoreError> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        "SELECT status, status_text, headers, body, response_type, cached_at
         FROM cache_entries WHERE generation = ? AND request_hash = ?",
        params![generation, key.cache_hash()],
        |row| {
          Ok((
            row.get::<_, u16>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Vec<u8>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
          ))
        },
      )
      .optional()?;

    let Some((status, status_text, headers, body, response_type, cached_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
    let kind = ResponseType::parse(&response_type).ok_or_else(|| {
      StoreError::Access(format!("unknown response type '{}' in cache", response_type))
    })?;

    Ok(Some(CacheEntry {
      response: Response {
        status,
        status_text,
        headers,
        body,
        kind,
      },
      cached_at: parse_datetime(&cached_at),
    }))
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<(), StoreError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    ensure_generation(&tx, generation)?;
    insert_entry(&tx, generation, key, response)?;
    tx.commit()?;
    Ok(())
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<(), StoreError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    ensure_generation(&tx, generation)?;
    for (key, response) in entries {
      insert_entry(&tx, generation, key, response)?;
    }
    tx.commit()?;
    Ok(())
  }

  fn delete_generation(&self, generation: &str) -> Result<bool, StoreError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM cache_entries WHERE generation = ?",
      params![generation],
    )?;
    let deleted = tx.execute(
      "DELETE FROM cache_generations WHERE name = ?",
      params![generation],
    )?;
    tx.commit()?;
    Ok(deleted > 0)
  }

  fn entry_count(&self, generation: &str) -> Result<usize, StoreError> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM cache_entries WHERE generation = ?",
      params![generation],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format, falling back to now.
fn parse_datetime(s: &str) -> DateTime<Utc> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use tempfile::TempDir;
  use url::Url;

  fn key(path: &str) -> RequestKey {
    let url = Url::parse("http://localhost:3000").unwrap().join(path).unwrap();
    RequestKey::new(Method::GET, &url)
  }

  fn response(body: &str) -> Response {
    Response {
      status: 200,
      status_text: "OK".to_string(),
      headers: vec![("Content-Type".to_string(), "text/css".to_string())],
      body: body.as_bytes().to_vec(),
      kind: ResponseType::Basic,
    }
  }

  #[test]
  fn test_put_and_get() {
    let storage = SqliteCacheStorage::open_in_memory().unwrap();
    storage.put("dynamic-v1", &key("/main.css"), &response("body{}")).unwrap();

    let entry = storage.get("dynamic-v1", &key("/main.css")).unwrap().unwrap();
    assert_eq!(entry.response, response("body{}"));
    assert_eq!(storage.get("static-v1", &key("/main.css")).unwrap(), None);
    assert_eq!(storage.generations().unwrap(), vec!["dynamic-v1"]);
  }

  #[test]
  fn test_put_replaces_existing_entry() {
    let storage = SqliteCacheStorage::open_in_memory().unwrap();
    storage.put("dynamic-v1", &key("/a.js"), &response("one")).unwrap();
    storage.put("dynamic-v1", &key("/a.js"), &response("two")).unwrap();

    assert_eq!(storage.entry_count("dynamic-v1").unwrap(), 1);
    let entry = storage.get("dynamic-v1", &key("/a.js")).unwrap().unwrap();
    assert_eq!(entry.response.text(), "two");
  }

  #[test]
  fn test_put_all_and_delete_generation() {
    let storage = SqliteCacheStorage::open_in_memory().unwrap();
    let entries = vec![
      (key("/"), response("root")),
      (key("/index.html"), response("index")),
    ];
    storage.put_all("static-v1", &entries).unwrap();
    storage.put("dynamic-v1", &key("/x.png"), &response("x")).unwrap();

    assert_eq!(storage.entry_count("static-v1").unwrap(), 2);
    assert!(storage.delete_generation("static-v1").unwrap());
    assert!(!storage.delete_generation("static-v1").unwrap());

    assert_eq!(storage.entry_count("static-v1").unwrap(), 0);
    assert_eq!(storage.generations().unwrap(), vec!["dynamic-v1"]);
  }

  #[test]
  fn test_entries_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cache.db");

    {
      let storage = SqliteCacheStorage::open(&path).unwrap();
      storage.put("static-v3", &key("/poems.js"), &response("poems")).unwrap();
    }

    let storage = SqliteCacheStorage::open(&path).unwrap();
    let entry = storage.get("static-v3", &key("/poems.js")).unwrap().unwrap();
    assert_eq!(entry.response.text(), "poems");
  }
}
