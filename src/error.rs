//! Error types for the cache and sync layer.
//!
//! None of these are fatal to the host. Store errors are recovered locally
//! with a default value, network errors turn into offline fallbacks, and
//! replay errors leave the pending queue in place for the next trigger.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::sync::SyncTag;

/// Failure of the persistent key-value or cache storage.
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("failed to (de)serialize stored value: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("storage quota exceeded")]
  Quota,

  #[error("storage access denied: {0}")]
  Access(String),

  #[error("storage backend error: {0}")]
  Backend(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
  fn from(err: rusqlite::Error) -> Self {
    match err.sqlite_error_code() {
      Some(ErrorCode::DiskFull) => StoreError::Quota,
      Some(ErrorCode::PermissionDenied | ErrorCode::ReadOnly | ErrorCode::CannotOpen) => {
        StoreError::Access(err.to_string())
      }
      _ => StoreError::Backend(err),
    }
  }
}

/// A network fetch rejected before producing a response.
#[derive(Error, Debug)]
pub enum NetworkError {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("invalid request URL '{url}': {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("network unreachable")]
  Offline,
}

/// The install manifest could not be cached in full.
#[derive(Error, Debug)]
pub enum CachePopulationError {
  #[error("failed to fetch manifest entry {url}: {source}")]
  Fetch {
    url: String,
    #[source]
    source: NetworkError,
  },

  #[error("manifest entry {url} answered with status {status}")]
  BadStatus { url: String, status: u16 },

  #[error("failed to write static cache: {0}")]
  Store(#[from] StoreError),
}

/// A queued mutation could not be replayed; the queue is kept intact.
#[derive(Error, Debug)]
#[error("replay of {tag} entry #{index} failed: {source}")]
pub struct ReplayError {
  pub tag: SyncTag,
  pub index: usize,
  #[source]
  pub source: StoreError,
}

/// The worker task stopped before answering.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("worker task has stopped")]
pub struct WorkerGone;
