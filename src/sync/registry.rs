//! Persisted set of sync tags awaiting a replay trigger.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::SyncTag;
use crate::error::StoreError;
use crate::store::{read_json, write_json, KeyValueStore};

const REGISTRY_KEY: &str = "pending-sync-tags";

/// Tags registered while offline. The platform reads these on reconnect and
/// invokes the matching drain; the controller itself never polls.
pub struct SyncRegistry<S> {
  store: Arc<S>,
}

impl<S: KeyValueStore> SyncRegistry<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store }
  }

  pub fn registered(&self) -> BTreeSet<SyncTag> {
    read_json(self.store.as_ref(), REGISTRY_KEY)
  }

  pub fn register(&self, tag: SyncTag) -> Result<(), StoreError> {
    let mut tags = self.registered();
    if tags.insert(tag) {
      write_json(self.store.as_ref(), REGISTRY_KEY, &tags)?;
    }
    Ok(())
  }

  pub fn unregister(&self, tag: SyncTag) -> Result<(), StoreError> {
    let mut tags = self.registered();
    if !tags.remove(&tag) {
      return Ok(());
    }
    if tags.is_empty() {
      self.store.remove(REGISTRY_KEY)
    } else {
      write_json(self.store.as_ref(), REGISTRY_KEY, &tags)
    }
  }
}
