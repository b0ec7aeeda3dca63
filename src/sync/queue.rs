//! Append-only pending mutation queue stored under one key per feature.

use std::sync::Arc;
use tracing::{debug, info};

use super::{MutationAction, PendingMutation, Replay, SyncTag};
use crate::error::{ReplayError, StoreError};
use crate::features::ItemId;
use crate::store::{read_json, write_json, KeyValueStore};

/// Outcome of a successful drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
  pub tag: SyncTag,
  pub replayed: usize,
}

/// Ordered log of mutations for a single sync tag.
pub struct PendingQueue<S> {
  store: Arc<S>,
  tag: SyncTag,
}

impl<S: KeyValueStore> PendingQueue<S> {
  pub fn new(store: Arc<S>, tag: SyncTag) -> Self {
    Self { store, tag }
  }

  pub fn tag(&self) -> SyncTag {
    self.tag
  }

  /// Append a mutation stamped with the current time.
  ///
  /// Read-modify-write of the whole sequence: concurrent writers race and the
  /// last one wins.
  pub fn enqueue(
    &self,
    action: MutationAction,
    subject_id: ItemId,
    payload: Option<i32>,
  ) -> Result<(), StoreError> {
    let mut entries = self.pending();
    entries.push(PendingMutation::new(action, subject_id, payload));
    write_json(self.store.as_ref(), self.tag.queue_key(), &entries)?;
    debug!(tag = %self.tag, subject_id, ?action, queued = entries.len(), "queued offline mutation");
    Ok(())
  }

  /// Everything currently queued, oldest first.
  pub fn pending(&self) -> Vec<PendingMutation> {
    read_json(self.store.as_ref(), self.tag.queue_key())
  }

  pub fn len(&self) -> usize {
    self.pending().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Replay every queued mutation in order, then clear the queue.
  ///
  /// The queue is only cleared when every replay succeeded. On failure it is
  /// left untouched and the whole sequence is redelivered on the next drain.
  /// A failure to clear is reported with `index == replayed count`.
  pub fn drain_and_clear<R>(&self, replayer: &R) -> Result<DrainReport, ReplayError>
  where
    R: Replay + ?Sized,
  {
    let entries = self.pending();
    if entries.is_empty() {
      return Ok(DrainReport {
        tag: self.tag,
        replayed: 0,
      });
    }

    for (index, mutation) in entries.iter().enumerate() {
      replayer.replay(mutation).map_err(|source| ReplayError {
        tag: self.tag,
        index,
        source,
      })?;
    }

    self
      .store
      .remove(self.tag.queue_key())
      .map_err(|source| ReplayError {
        tag: self.tag,
        index: entries.len(),
        source,
      })?;

    info!(tag = %self.tag, replayed = entries.len(), "drained pending queue");
    Ok(DrainReport {
      tag: self.tag,
      replayed: entries.len(),
    })
  }
}
