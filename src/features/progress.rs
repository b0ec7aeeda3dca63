//! Reading progress per item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::ItemId;
use crate::connectivity::Connectivity;
use crate::error::StoreError;
use crate::store::{read_json, write_json, KeyValueStore};
use crate::sync::{MutationAction, OfflineRecorder, PendingMutation, Replay, SyncTag};

pub(crate) const PROGRESS_KEY: &str = "poetry-app-progress";

/// Reading status, derived from the percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
  #[default]
  New,
  Reading,
  Read,
}

impl ReadingStatus {
  pub fn from_percent(percent: i32) -> Self {
    if percent >= 100 {
      ReadingStatus::Read
    } else if percent > 0 {
      ReadingStatus::Reading
    } else {
      ReadingStatus::New
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ReadingStatus::New => "new",
      ReadingStatus::Reading => "reading",
      ReadingStatus::Read => "read",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
  pub progress: u8,
  pub status: ReadingStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_read: Option<DateTime<Utc>>,
}

impl ProgressRecord {
  fn at(percent: i32, last_read: DateTime<Utc>) -> Self {
    Self {
      // Lossless: clamped into 0..=100 first.
      progress: percent.clamp(0, 100) as u8,
      status: ReadingStatus::from_percent(percent),
      last_read: Some(last_read),
    }
  }
}

/// Counts per status across every tracked item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSummary {
  pub new: usize,
  pub reading: usize,
  pub read: usize,
}

/// Progress persisted as `{"<id>": {progress, status, lastRead}}`.
pub struct Progress<S> {
  store: Arc<S>,
  recorder: OfflineRecorder<S>,
}

impl<S: KeyValueStore> Progress<S> {
  pub fn new(store: Arc<S>, connectivity: Connectivity) -> Self {
    Self {
      recorder: OfflineRecorder::new(store.clone(), SyncTag::Progress, connectivity),
      store,
    }
  }

  pub fn all(&self) -> BTreeMap<ItemId, ProgressRecord> {
    read_json(self.store.as_ref(), PROGRESS_KEY)
  }

  /// Progress for `id`; untracked items read as 0% / new.
  pub fn get(&self, id: ItemId) -> ProgressRecord {
    self.all().remove(&id).unwrap_or_default()
  }

  /// Record progress, clamped to 0..=100, with the status derived from it.
  pub fn update(&self, id: ItemId, percent: i32) -> Result<ProgressRecord, StoreError> {
    let record = self.apply_update(id, percent, Utc::now())?;
    self
      .recorder
      .record(MutationAction::Set, id, Some(i32::from(record.progress)));
    Ok(record)
  }

  pub fn summary(&self) -> ProgressSummary {
    self
      .all()
      .values()
      .fold(ProgressSummary::default(), |mut acc, record| {
        match record.status {
          ReadingStatus::New => acc.new += 1,
          ReadingStatus::Reading => acc.reading += 1,
          ReadingStatus::Read => acc.read += 1,
        }
        acc
      })
  }

  pub fn recorder(&self) -> &OfflineRecorder<S> {
    &self.recorder
  }

  fn apply_update(
    &self,
    id: ItemId,
    percent: i32,
    at: DateTime<Utc>,
  ) -> Result<ProgressRecord, StoreError> {
    let record = ProgressRecord::at(percent, at);
    let mut all = self.all();
    all.insert(id, record.clone());
    write_json(self.store.as_ref(), PROGRESS_KEY, &all)?;
    Ok(record)
  }
}

impl<S: KeyValueStore> Replay for Progress<S> {
  fn replay(&self, mutation: &PendingMutation) -> Result<(), StoreError> {
    match (mutation.action, mutation.payload) {
      (MutationAction::Set, Some(percent)) => {
        // Replaying with the original timestamp keeps redelivery idempotent.
        self.apply_update(mutation.subject_id, percent, mutation.timestamp)?;
        debug!(subject_id = mutation.subject_id, percent, "replayed progress");
      }
      (action, _) => {
        debug!(subject_id = mutation.subject_id, ?action, "skipping progress mutation without a value");
      }
    }
    Ok(())
  }
}
