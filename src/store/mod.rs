//! Persistent key-value store for per-feature user state.
//!
//! The contract mirrors an origin-scoped local storage API: string keys,
//! string (JSON) values, synchronous calls. `get` never fails past this
//! boundary; backends log the failure and report the key as absent so every
//! caller can fall back to an empty default.

#[cfg(test)]
mod memory;
mod sqlite;

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::error::StoreError;

#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// String-keyed persistence used by the feature managers and queues.
pub trait KeyValueStore: Send + Sync {
  /// Read a value. Backend failures are logged and reported as `None`.
  fn get(&self, key: &str) -> Option<String>;

  /// Write a value, replacing any previous one.
  fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

  /// Delete a key. Removing an absent key is not an error.
  fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Read and decode a JSON blob, substituting `T::default()` when the key is
/// missing or its contents don't decode.
pub fn read_json<T, S>(store: &S, key: &str) -> T
where
  T: DeserializeOwned + Default,
  S: KeyValueStore + ?Sized,
{
  let Some(raw) = store.get(key) else {
    return T::default();
  };

  match serde_json::from_str(&raw) {
    Ok(value) => value,
    Err(e) => {
      warn!(key, error = %e, "discarding undecodable stored value");
      T::default()
    }
  }
}

/// Encode a value as JSON and write it under `key`.
pub fn write_json<T, S>(store: &S, key: &str, value: &T) -> Result<(), StoreError>
where
  T: Serialize + ?Sized,
  S: KeyValueStore + ?Sized,
{
  let raw = serde_json::to_string(value)?;
  store.set(key, &raw)
}
