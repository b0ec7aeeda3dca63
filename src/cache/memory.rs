//! In-memory cache storage used by tests.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::traits::{CacheEntry, CacheStorage, RequestKey};
use crate::error::StoreError;
use crate::http::Response;

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
  generations: Mutex<BTreeMap<String, HashMap<RequestKey, CacheEntry>>>,
  writes: AtomicUsize,
  failing: AtomicBool,
}

impl MemoryCacheStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of successful `put`/`put_all` calls.
  pub fn writes(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  pub fn fail_writes(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  fn lock(
    &self,
  ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, HashMap<RequestKey, CacheEntry>>>, StoreError>
  {
    self
      .generations
      .lock()
      .map_err(|e| StoreError::Access(format!("lock poisoned: {}", e)))
  }

  fn check_writable(&self) -> Result<(), StoreError> {
    if self.failing.load(Ordering::SeqCst) {
      Err(StoreError::Quota)
    } else {
      Ok(())
    }
  }
}

impl CacheStorage for MemoryCacheStorage {
  fn generations(&self) -> Result<Vec<String>, StoreError> {
    Ok(self.lock()?.keys().cloned().collect())
  }

  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>, StoreError> {
    Ok(
      self
        .lock()?
        .get(generation)
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<(), StoreError> {
    self.put_all(generation, &[(key.clone(), response.clone())])
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<(), StoreError> {
    self.check_writable()?;
    let mut generations = self.lock()?;
    let target = generations.entry(generation.to_string()).or_default();
    for (key, response) in entries {
      target.insert(
        key.clone(),
        CacheEntry {
          response: response.clone(),
          cached_at: Utc::now(),
        },
      );
    }
    self.writes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn delete_generation(&self, generation: &str) -> Result<bool, StoreError> {
    self.check_writable()?;
    Ok(self.lock()?.remove(generation).is_some())
  }

  fn entry_count(&self, generation: &str) -> Result<usize, StoreError> {
    Ok(self.lock()?.get(generation).map_or(0, HashMap::len))
  }
}
