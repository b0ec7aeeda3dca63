//! Favorite flag per item.

use std::sync::Arc;
use tracing::debug;

use super::ItemId;
use crate::connectivity::Connectivity;
use crate::error::StoreError;
use crate::store::{read_json, write_json, KeyValueStore};
use crate::sync::{MutationAction, OfflineRecorder, PendingMutation, Replay, SyncTag};

pub(crate) const FAVORITES_KEY: &str = "poetry-app-favorites";

/// Favorites persisted as an ordered JSON array of item ids.
pub struct Favorites<S> {
  store: Arc<S>,
  recorder: OfflineRecorder<S>,
}

impl<S: KeyValueStore> Favorites<S> {
  pub fn new(store: Arc<S>, connectivity: Connectivity) -> Self {
    Self {
      recorder: OfflineRecorder::new(store.clone(), SyncTag::Favorites, connectivity),
      store,
    }
  }

  /// Favorited ids in the order they were added.
  pub fn all(&self) -> Vec<ItemId> {
    read_json(self.store.as_ref(), FAVORITES_KEY)
  }

  pub fn is_favorited(&self, id: ItemId) -> bool {
    self.all().contains(&id)
  }

  pub fn add(&self, id: ItemId) -> Result<(), StoreError> {
    self.apply_add(id)?;
    self.recorder.record(MutationAction::Add, id, None);
    Ok(())
  }

  pub fn remove(&self, id: ItemId) -> Result<(), StoreError> {
    self.apply_remove(id)?;
    self.recorder.record(MutationAction::Remove, id, None);
    Ok(())
  }

  /// Flip the flag and return the new state.
  pub fn toggle(&self, id: ItemId) -> Result<bool, StoreError> {
    if self.is_favorited(id) {
      self.remove(id)?;
      Ok(false)
    } else {
      self.add(id)?;
      Ok(true)
    }
  }

  /// Remove every favorite, recording a removal per id so a later replay
  /// cannot bring queued additions back.
  pub fn clear_all(&self) -> Result<(), StoreError> {
    let cleared = self.all();
    self.store.remove(FAVORITES_KEY)?;
    for id in cleared {
      self.recorder.record(MutationAction::Remove, id, None);
    }
    Ok(())
  }

  pub fn recorder(&self) -> &OfflineRecorder<S> {
    &self.recorder
  }

  fn apply_add(&self, id: ItemId) -> Result<(), StoreError> {
    let mut favorites = self.all();
    if favorites.contains(&id) {
      return Ok(());
    }
    favorites.push(id);
    write_json(self.store.as_ref(), FAVORITES_KEY, &favorites)
  }

  fn apply_remove(&self, id: ItemId) -> Result<(), StoreError> {
    let favorites = self.all();
    if !favorites.contains(&id) {
      return Ok(());
    }
    let remaining: Vec<ItemId> = favorites.into_iter().filter(|&f| f != id).collect();
    write_json(self.store.as_ref(), FAVORITES_KEY, &remaining)
  }
}

impl<S: KeyValueStore> Replay for Favorites<S> {
  fn replay(&self, mutation: &PendingMutation) -> Result<(), StoreError> {
    let id = mutation.subject_id;
    match (mutation.action, mutation.payload) {
      (MutationAction::Add, _) => self.apply_add(id)?,
      (MutationAction::Remove, _) => self.apply_remove(id)?,
      (MutationAction::Set, Some(flag)) if flag != 0 => self.apply_add(id)?,
      (MutationAction::Set, _) => self.apply_remove(id)?,
    }
    debug!(subject_id = id, action = ?mutation.action, "replayed favorite");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn favorites(online: bool) -> (Arc<MemoryStore>, Favorites<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let favorites = Favorites::new(store.clone(), Connectivity::new(online));
    (store, favorites)
  }

  #[test]
  fn test_add_remove_round_trip() {
    let (_, favorites) = favorites(true);

    assert!(!favorites.is_favorited(7));
    favorites.add(7).unwrap();
    assert!(favorites.is_favorited(7));
    favorites.remove(7).unwrap();
    assert!(!favorites.is_favorited(7));
  }

  #[test]
  fn test_add_is_idempotent_and_keeps_order() {
    let (store, favorites) = favorites(true);

    favorites.add(3).unwrap();
    favorites.add(1).unwrap();
    favorites.add(3).unwrap();

    assert_eq!(favorites.all(), vec![3, 1]);
    assert_eq!(store.get(FAVORITES_KEY).as_deref(), Some("[3,1]"));
  }

  #[test]
  fn test_toggle() {
    let (_, favorites) = favorites(true);
    assert!(favorites.toggle(2).unwrap());
    assert!(!favorites.toggle(2).unwrap());
  }

  #[test]
  fn test_clear_all() {
    let (store, favorites) = favorites(true);
    favorites.add(1).unwrap();
    favorites.clear_all().unwrap();

    assert!(favorites.all().is_empty());
    assert_eq!(store.get(FAVORITES_KEY), None);
  }

  #[test]
  fn test_offline_clear_all_queues_removals() {
    let (_, favorites) = favorites(false);
    favorites.add(4).unwrap();
    favorites.add(9).unwrap();
    favorites.clear_all().unwrap();

    let actions: Vec<_> = favorites
      .recorder()
      .queue()
      .pending()
      .iter()
      .map(|m| (m.action, m.subject_id))
      .collect();
    assert_eq!(
      actions,
      vec![
        (MutationAction::Add, 4),
        (MutationAction::Add, 9),
        (MutationAction::Remove, 4),
        (MutationAction::Remove, 9),
      ]
    );
  }

  #[test]
  fn test_corrupt_blob_reads_as_empty() {
    let (store, favorites) = favorites(true);
    store.set(FAVORITES_KEY, "{\"oops\":").unwrap();

    assert!(favorites.all().is_empty());
    favorites.add(4).unwrap();
    assert_eq!(favorites.all(), vec![4]);
  }

  #[test]
  fn test_online_mutation_is_not_queued() {
    let (_, favorites) = favorites(true);
    favorites.add(1).unwrap();
    assert!(favorites.recorder().queue().is_empty());
  }

  #[test]
  fn test_offline_mutations_are_queued_in_order() {
    let (_, favorites) = favorites(false);

    favorites.add(5).unwrap();
    favorites.remove(5).unwrap();

    let queued = favorites.recorder().queue().pending();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].action, MutationAction::Add);
    assert_eq!(queued[1].action, MutationAction::Remove);
    assert!(!favorites.is_favorited(5));
  }

  #[test]
  fn test_write_failure_is_reported_and_nothing_queued() {
    let (store, favorites) = favorites(false);
    store.fail_writes(true);

    assert!(favorites.add(9).is_err());
    assert!(favorites.recorder().queue().is_empty());
  }
}
