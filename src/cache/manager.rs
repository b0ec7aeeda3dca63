//! Cache manager that owns the static and dynamic generations of one version.

use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::traits::{CacheEntry, CacheState, CacheStorage, GenerationKind, GenerationName, RequestKey};
use crate::error::{CachePopulationError, StoreError};
use crate::http::{Fetcher, Request, Response};

/// Answers "is this cached" and "cache this" for the current version.
///
/// Lookups see every generation still on disk, so entries from an older
/// version keep answering until activation evicts them.
pub struct CacheManager<S: CacheStorage> {
  storage: Arc<S>,
  version: String,
}

impl<S: CacheStorage> CacheManager<S> {
  pub fn new(storage: S, version: impl Into<String>) -> Self {
    Self {
      storage: Arc::new(storage),
      version: version.into(),
    }
  }

  /// Manager for another version over the same storage.
  pub fn for_version(&self, version: impl Into<String>) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      version: version.into(),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  #[cfg(test)]
  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn static_generation(&self) -> GenerationName {
    GenerationName::static_for(&self.version)
  }

  pub fn dynamic_generation(&self) -> GenerationName {
    GenerationName::dynamic_for(&self.version)
  }

  pub fn state(&self) -> Result<CacheState, StoreError> {
    let existing = self.storage.generations()?;
    let has = |name: GenerationName| existing.contains(&name.to_string());

    Ok(
      match (has(self.static_generation()), has(self.dynamic_generation())) {
        (false, _) => CacheState::NoCache,
        (true, false) => CacheState::StaticOnly,
        (true, true) => CacheState::StaticAndDynamic,
      },
    )
  }

  /// Every generation on disk with its entry count, in lookup order.
  pub fn generations(&self) -> Result<Vec<(String, usize)>, StoreError> {
    self
      .lookup_order()?
      .into_iter()
      .map(|name| {
        let count = self.storage.entry_count(&name)?;
        Ok((name, count))
      })
      .collect()
  }

  /// Fetch every manifest entry and write them to the static generation in
  /// one batch. Any failed fetch or non-2xx status aborts without writing.
  pub async fn populate_static<F: Fetcher>(
    &self,
    fetcher: &F,
    manifest: &[Request],
  ) -> Result<usize, CachePopulationError> {
    let fetches = manifest.iter().map(|request| async move {
      let url = request.url.to_string();
      let response = fetcher
        .fetch(request)
        .await
        .map_err(|source| CachePopulationError::Fetch {
          url: url.clone(),
          source,
        })?;

      if !response.is_ok() {
        return Err(CachePopulationError::BadStatus {
          url,
          status: response.status,
        });
      }
      Ok((RequestKey::from(request), response))
    });

    let entries = try_join_all(fetches).await?;
    let generation = self.static_generation().to_string();
    self.storage.put_all(&generation, &entries)?;

    info!(generation = %generation, entries = entries.len(), "populated static cache");
    Ok(entries.len())
  }

  /// First hit across all generations: static before dynamic, current
  /// version before older ones.
  pub fn lookup(&self, key: &RequestKey) -> Result<Option<CacheEntry>, StoreError> {
    for generation in self.lookup_order()? {
      if let Some(entry) = self.storage.get(&generation, key)? {
        debug!(request = %key.description(), generation = %generation, "cache hit");
        return Ok(Some(entry));
      }
    }
    debug!(request = %key.description(), "cache miss");
    Ok(None)
  }

  /// Write a network response into the dynamic generation. Only 200
  /// same-origin responses are accepted; returns whether it was written.
  pub fn store(&self, key: &RequestKey, response: &Response) -> Result<bool, StoreError> {
    if !response.is_cacheable() {
      debug!(
        request = %key.description(),
        status = response.status,
        kind = response.kind.as_str(),
        "response not cacheable"
      );
      return Ok(false);
    }

    let generation = self.dynamic_generation().to_string();
    self.storage.put(&generation, key, response)?;
    debug!(request = %key.description(), generation = %generation, "cached dynamic content");
    Ok(true)
  }

  /// Delete every generation whose name is not in `keep`. Returns the
  /// deleted names.
  pub fn evict_stale(&self, keep: &BTreeSet<String>) -> Result<Vec<String>, StoreError> {
    let mut evicted = Vec::new();
    for name in self.storage.generations()? {
      if keep.contains(&name) {
        continue;
      }
      if self.storage.delete_generation(&name)? {
        info!(generation = %name, "deleted old cache generation");
        evicted.push(name);
      }
    }
    Ok(evicted)
  }

  fn lookup_order(&self) -> Result<Vec<String>, StoreError> {
    let current_static = self.static_generation().to_string();
    let current_dynamic = self.dynamic_generation().to_string();

    let mut names = self.storage.generations()?;
    names.sort_by_key(|name| {
      let rank = if *name == current_static {
        0
      } else if *name == current_dynamic {
        1
      } else {
        match name.parse::<GenerationName>() {
          Ok(parsed) if parsed.kind == GenerationKind::Static => 2,
          Ok(_) => 3,
          Err(_) => 4,
        }
      };
      (rank, name.clone())
    });
    Ok(names)
  }
}

impl<S: CacheStorage> Clone for CacheManager<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      version: self.version.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryCacheStorage;
  use crate::http::{ResponseType, ScriptedFetcher};
  use url::Url;

  const ORIGIN: &str = "http://localhost:3000";

  fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
  }

  fn manifest(paths: &[&str]) -> Vec<Request> {
    paths
      .iter()
      .map(|p| Request::resolve(&origin(), p).unwrap())
      .collect()
  }

  fn key(path: &str) -> RequestKey {
    RequestKey::from(&Request::resolve(&origin(), path).unwrap())
  }

  fn site() -> ScriptedFetcher {
    ScriptedFetcher::new()
      .route("http://localhost:3000/", ScriptedFetcher::page("root"))
      .route("http://localhost:3000/index.html", ScriptedFetcher::page("index"))
      .route("http://localhost:3000/main.css", ScriptedFetcher::page("css"))
  }

  #[tokio::test]
  async fn test_populate_static_then_lookup_without_network() {
    let cache = CacheManager::new(MemoryCacheStorage::new(), "v1");
    let fetcher = site();

    let count = cache
      .populate_static(&fetcher, &manifest(&["/", "/index.html", "/main.css"]))
      .await
      .unwrap();
    assert_eq!(count, 3);
    assert_eq!(cache.state().unwrap(), CacheState::StaticOnly);

    let calls = fetcher.calls();
    let entry = cache.lookup(&key("/main.css")).unwrap().unwrap();
    assert_eq!(entry.response.text(), "css");
    assert_eq!(fetcher.calls(), calls);
  }

  #[tokio::test]
  async fn test_populate_static_is_all_or_nothing() {
    let cache = CacheManager::new(MemoryCacheStorage::new(), "v1");
    let fetcher = site();
    fetcher.fail("http://localhost:3000/main.css");

    let err = cache
      .populate_static(&fetcher, &manifest(&["/", "/index.html", "/main.css"]))
      .await
      .unwrap_err();

    assert!(matches!(err, CachePopulationError::Fetch { ref url, .. } if url.ends_with("/main.css")));
    assert_eq!(cache.state().unwrap(), CacheState::NoCache);
    assert_eq!(cache.lookup(&key("/")).unwrap(), None);
  }

  #[tokio::test]
  async fn test_populate_static_rejects_error_status() {
    let cache = CacheManager::new(MemoryCacheStorage::new(), "v1");

    let err = cache
      .populate_static(&site(), &manifest(&["/", "/missing.png"]))
      .await
      .unwrap_err();

    assert!(matches!(err, CachePopulationError::BadStatus { status: 404, .. }));
    assert_eq!(cache.storage().writes(), 0);
  }

  #[test]
  fn test_store_only_accepts_basic_200() {
    let cache = CacheManager::new(MemoryCacheStorage::new(), "v1");

    let mut cross_origin = ScriptedFetcher::page("font");
    cross_origin.kind = ResponseType::Cors;
    assert!(!cache.store(&key("/font.woff2"), &cross_origin).unwrap());

    let mut not_found = ScriptedFetcher::page("nope");
    not_found.status = 404;
    assert!(!cache.store(&key("/nope"), &not_found).unwrap());

    let mut opaque = ScriptedFetcher::page("");
    opaque.kind = ResponseType::Opaque;
    assert!(!cache.store(&key("/pixel.gif"), &opaque).unwrap());

    assert_eq!(cache.state().unwrap(), CacheState::NoCache);
    assert!(cache.store(&key("/poems.js"), &ScriptedFetcher::page("ok")).unwrap());

    let generations = cache.storage().generations().unwrap();
    assert_eq!(generations, vec!["dynamic-v1"]);
  }

  #[test]
  fn test_lookup_prefers_static_over_dynamic() {
    let storage = MemoryCacheStorage::new();
    storage
      .put("dynamic-v1", &key("/index.html"), &ScriptedFetcher::page("dynamic"))
      .unwrap();
    storage
      .put("static-v1", &key("/index.html"), &ScriptedFetcher::page("static"))
      .unwrap();
    let cache = CacheManager::new(storage, "v1");

    let entry = cache.lookup(&key("/index.html")).unwrap().unwrap();
    assert_eq!(entry.response.text(), "static");
    assert_eq!(cache.state().unwrap(), CacheState::StaticAndDynamic);
  }

  #[test]
  fn test_lookup_falls_back_to_older_generation_until_evicted() {
    let storage = MemoryCacheStorage::new();
    storage
      .put("static-v1", &key("/logic.js"), &ScriptedFetcher::page("old"))
      .unwrap();
    let cache = CacheManager::new(storage, "v2");

    assert!(cache.lookup(&key("/logic.js")).unwrap().is_some());

    let keep = [cache.static_generation(), cache.dynamic_generation()]
      .iter()
      .map(ToString::to_string)
      .collect();
    cache.evict_stale(&keep).unwrap();
    assert!(cache.lookup(&key("/logic.js")).unwrap().is_none());
  }

  #[test]
  fn test_evict_stale_keeps_only_current() {
    let storage = MemoryCacheStorage::new();
    for generation in ["static-v1", "dynamic-v1", "static-v2", "dynamic-v2", "poetry-app-v1"] {
      storage
        .put(generation, &key("/"), &ScriptedFetcher::page(generation))
        .unwrap();
    }
    let cache = CacheManager::new(storage, "v2");

    let keep: BTreeSet<String> = ["static-v2", "dynamic-v2"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    let mut evicted = cache.evict_stale(&keep).unwrap();
    evicted.sort();

    assert_eq!(evicted, vec!["dynamic-v1", "poetry-app-v1", "static-v1"]);
    assert_eq!(cache.storage().generations().unwrap(), vec!["dynamic-v2", "static-v2"]);
    assert_eq!(cache.storage().entry_count("static-v2").unwrap(), 1);
    assert_eq!(cache.storage().entry_count("dynamic-v2").unwrap(), 1);
  }

  #[test]
  fn test_generations_listed_in_lookup_order() {
    let storage = MemoryCacheStorage::new();
    for generation in ["dynamic-v1", "static-v1", "dynamic-v2", "static-v2"] {
      storage
        .put(generation, &key("/"), &ScriptedFetcher::page(generation))
        .unwrap();
    }
    let cache = CacheManager::new(storage, "v2");

    let names: Vec<String> = cache.generations().unwrap().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["static-v2", "dynamic-v2", "static-v1", "dynamic-v1"]);
  }
}
