//! Star rating per item.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::ItemId;
use crate::connectivity::Connectivity;
use crate::error::StoreError;
use crate::store::{read_json, write_json, KeyValueStore};
use crate::sync::{MutationAction, OfflineRecorder, PendingMutation, Replay, SyncTag};

pub(crate) const RATINGS_KEY: &str = "poetry-app-ratings";

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Ratings persisted as `{"<id>": 1..=5}`.
pub struct Ratings<S> {
  store: Arc<S>,
  recorder: OfflineRecorder<S>,
}

impl<S: KeyValueStore> Ratings<S> {
  pub fn new(store: Arc<S>, connectivity: Connectivity) -> Self {
    Self {
      recorder: OfflineRecorder::new(store.clone(), SyncTag::Ratings, connectivity),
      store,
    }
  }

  pub fn all(&self) -> BTreeMap<ItemId, u8> {
    read_json(self.store.as_ref(), RATINGS_KEY)
  }

  /// Rating for `id`, or 0 when the item has never been rated.
  pub fn get(&self, id: ItemId) -> u8 {
    self.all().get(&id).copied().unwrap_or(0)
  }

  /// Store a rating, silently clamped to 1..=5. Returns the stored value.
  pub fn set(&self, id: ItemId, value: i32) -> Result<u8, StoreError> {
    let rating = self.apply_set(id, value)?;
    self.recorder.record(MutationAction::Set, id, Some(i32::from(rating)));
    Ok(rating)
  }

  pub fn recorder(&self) -> &OfflineRecorder<S> {
    &self.recorder
  }

  fn apply_set(&self, id: ItemId, value: i32) -> Result<u8, StoreError> {
    let rating = clamp_rating(value);
    let mut ratings = self.all();
    ratings.insert(id, rating);
    write_json(self.store.as_ref(), RATINGS_KEY, &ratings)?;
    Ok(rating)
  }
}

fn clamp_rating(value: i32) -> u8 {
  // Lossless: clamped into 1..=5 first.
  value.clamp(i32::from(MIN_RATING), i32::from(MAX_RATING)) as u8
}

impl<S: KeyValueStore> Replay for Ratings<S> {
  fn replay(&self, mutation: &PendingMutation) -> Result<(), StoreError> {
    match (mutation.action, mutation.payload) {
      (MutationAction::Set, Some(value)) => {
        self.apply_set(mutation.subject_id, value)?;
        debug!(subject_id = mutation.subject_id, value, "replayed rating");
      }
      (action, _) => {
        debug!(subject_id = mutation.subject_id, ?action, "skipping rating mutation without a value");
      }
    }
    Ok(())
  }
}
