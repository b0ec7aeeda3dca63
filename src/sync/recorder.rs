//! Queues a mutation when it is made without connectivity.

use std::sync::Arc;
use tracing::warn;

use super::{MutationAction, PendingQueue, SyncRegistry, SyncTag};
use crate::connectivity::Connectivity;
use crate::features::ItemId;
use crate::store::KeyValueStore;

/// Shared by the feature managers: after a successful local write, queue the
/// same mutation and register its sync tag if we are offline.
///
/// While a backlog is still waiting to be drained, online mutations join the
/// end of it as well, so replay never lands an older value over a newer one.
pub struct OfflineRecorder<S> {
  queue: PendingQueue<S>,
  registry: SyncRegistry<S>,
  connectivity: Connectivity,
}

impl<S: KeyValueStore> OfflineRecorder<S> {
  pub fn new(store: Arc<S>, tag: SyncTag, connectivity: Connectivity) -> Self {
    Self {
      queue: PendingQueue::new(store.clone(), tag),
      registry: SyncRegistry::new(store),
      connectivity,
    }
  }

  pub fn queue(&self) -> &PendingQueue<S> {
    &self.queue
  }

  /// Returns whether the mutation was queued. Queue failures are logged
  /// only; the local state change already happened.
  pub fn record(&self, action: MutationAction, subject_id: ItemId, payload: Option<i32>) -> bool {
    if self.connectivity.is_online() && self.queue.is_empty() {
      return false;
    }

    let tag = self.queue.tag();
    let result = self
      .queue
      .enqueue(action, subject_id, payload)
      .and_then(|()| self.registry.register(tag));

    match result {
      Ok(()) => true,
      Err(e) => {
        warn!(%tag, subject_id, error = %e, "failed to queue offline mutation");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  #[test]
  fn test_online_mutations_are_not_queued() {
    let store = Arc::new(MemoryStore::new());
    let recorder = OfflineRecorder::new(store.clone(), SyncTag::Favorites, Connectivity::new(true));

    assert!(!recorder.record(MutationAction::Add, 1, None));
    assert!(recorder.queue().is_empty());
    assert!(SyncRegistry::new(store).registered().is_empty());
  }

  #[test]
  fn test_offline_mutation_queues_and_registers_tag() {
    let store = Arc::new(MemoryStore::new());
    let connectivity = Connectivity::new(false);
    let recorder = OfflineRecorder::new(store.clone(), SyncTag::Ratings, connectivity);

    assert!(recorder.record(MutationAction::Set, 3, Some(4)));
    assert_eq!(recorder.queue().pending()[0].payload, Some(4));
    assert!(SyncRegistry::new(store).registered().contains(&SyncTag::Ratings));
  }

  #[test]
  fn test_online_mutation_joins_undrained_backlog() {
    let store = Arc::new(MemoryStore::new());
    let connectivity = Connectivity::new(false);
    let recorder = OfflineRecorder::new(store.clone(), SyncTag::Ratings, connectivity.clone());

    assert!(recorder.record(MutationAction::Set, 1, Some(3)));
    connectivity.set_online(true);
    assert!(recorder.record(MutationAction::Set, 1, Some(5)));

    let payloads: Vec<_> = recorder.queue().pending().iter().map(|m| m.payload).collect();
    assert_eq!(payloads, vec![Some(3), Some(5)]);
  }

  #[test]
  fn test_queue_failure_is_swallowed() {
    let store = Arc::new(MemoryStore::new());
    let recorder = OfflineRecorder::new(store.clone(), SyncTag::Progress, Connectivity::new(false));
    store.fail_writes(true);

    assert!(!recorder.record(MutationAction::Set, 3, Some(40)));
  }
}
