//! Core types and the storage trait for cache generations.

use chrono::{DateTime, Utc};
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;
use crate::http::{Request, Response};

/// Cache lookup key: method plus URL with any fragment dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: Method,
  url: String,
}

impl RequestKey {
  pub fn new(method: Method, url: &url::Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method,
      url: url.into(),
    }
  }

  /// Stable, fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form, e.g. `GET http://localhost:3000/main.css`.
  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

impl From<&Request> for RequestKey {
  fn from(request: &Request) -> Self {
    RequestKey::new(request.method.clone(), &request.url)
  }
}

/// The two kinds of cache generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GenerationKind {
  /// Install manifest, written once and never mutated afterwards.
  Static,
  /// Grows opportunistically from network responses.
  Dynamic,
}

impl GenerationKind {
  pub fn prefix(&self) -> &'static str {
    match self {
      GenerationKind::Static => "static",
      GenerationKind::Dynamic => "dynamic",
    }
  }
}

/// A versioned generation name: `static-<version>` or `dynamic-<version>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationName {
  pub kind: GenerationKind,
  pub version: String,
}

impl GenerationName {
  pub fn new(kind: GenerationKind, version: impl Into<String>) -> Self {
    Self {
      kind,
      version: version.into(),
    }
  }

  pub fn static_for(version: &str) -> Self {
    Self::new(GenerationKind::Static, version)
  }

  pub fn dynamic_for(version: &str) -> Self {
    Self::new(GenerationKind::Dynamic, version)
  }
}

impl fmt::Display for GenerationName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.kind.prefix(), self.version)
  }
}

impl FromStr for GenerationName {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (prefix, version) = s
      .split_once('-')
      .ok_or_else(|| format!("'{}' is not a generation name", s))?;

    let kind = match prefix {
      "static" => GenerationKind::Static,
      "dynamic" => GenerationKind::Dynamic,
      _ => return Err(format!("unknown generation kind in '{}'", s)),
    };
    if version.is_empty() {
      return Err(format!("missing version in '{}'", s));
    }

    Ok(Self::new(kind, version))
  }
}

/// A cached response plus when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Which of the current generations exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
  /// No static generation for the current version: not offline-ready.
  NoCache,
  StaticOnly,
  StaticAndDynamic,
}

/// Trait for cache generation backends.
///
/// Generations are addressed by their full name string so that names from
/// older schemes can still be listed and evicted.
pub trait CacheStorage: Send + Sync + 'static {
  /// Names of every generation that currently exists.
  fn generations(&self) -> Result<Vec<String>, StoreError>;

  /// Look up an entry in one generation.
  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>, StoreError>;

  /// Write one entry, creating the generation if needed.
  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<(), StoreError>;

  /// Write a batch of entries atomically, creating the generation if needed.
  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<(), StoreError>;

  /// Delete a generation and all its entries. Returns whether it existed.
  fn delete_generation(&self, generation: &str) -> Result<bool, StoreError>;

  /// Number of entries in a generation.
  fn entry_count(&self, generation: &str) -> Result<usize, StoreError>;
}
