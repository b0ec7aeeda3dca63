//! In-memory store used by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::KeyValueStore;
use crate::error::StoreError;

/// `HashMap`-backed store. Writes can be switched to fail with a quota error
/// to exercise the fail-soft paths of callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
  failing: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent `set`/`remove` fail with `StoreError::Quota`.
  pub fn fail_writes(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  fn check_writable(&self) -> Result<(), StoreError> {
    if self.failing.load(Ordering::SeqCst) {
      Err(StoreError::Quota)
    } else {
      Ok(())
    }
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Option<String> {
    self.entries.lock().ok()?.get(key).cloned()
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    self.check_writable()?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| StoreError::Access(format!("lock poisoned: {}", e)))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    self.check_writable()?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| StoreError::Access(format!("lock poisoned: {}", e)))?;
    entries.remove(key);
    Ok(())
  }
}
