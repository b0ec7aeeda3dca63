//! Request interception: cache first, then network, then offline fallback.

use reqwest::Method;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheManager, CacheStorage, RequestKey};
use crate::http::{Destination, Fetcher, Request, Response};

/// Root document served to navigations when offline.
pub const ROOT_DOCUMENT: &str = "/index.html";

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Cached entry, no network access.
  Cache,
  /// Fresh from the network.
  Network,
  /// Network failed; cached root document or a synthesized 503.
  OfflineFallback,
}

impl ResponseSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseSource::Cache => "cache",
      ResponseSource::Network => "network",
      ResponseSource::OfflineFallback => "offline-fallback",
    }
  }
}

/// A response produced by the pipeline.
#[derive(Debug)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
  /// Background write of a cloned network response into the dynamic
  /// generation. Dropping the handle detaches the write.
  pub write_back: Option<JoinHandle<()>>,
}

impl Served {
  pub(crate) fn new(response: Response, source: ResponseSource) -> Self {
    Self {
      response,
      source,
      write_back: None,
    }
  }
}

/// Outcome of intercepting a request.
#[derive(Debug)]
pub enum Interception {
  /// Not a GET over http(s): the caller performs it untouched.
  Bypass,
  Respond(Served),
}

/// Cache-first request pipeline.
///
/// Identical concurrent requests are not coalesced: each misses and fetches
/// on its own, and the later cache write wins.
pub struct Pipeline<S: CacheStorage, F: Fetcher> {
  cache: CacheManager<S>,
  fetcher: Arc<F>,
  root_document: RequestKey,
}

impl<S: CacheStorage, F: Fetcher> Pipeline<S, F> {
  pub fn new(cache: CacheManager<S>, fetcher: Arc<F>, origin: &Url) -> Self {
    let root = origin.join(ROOT_DOCUMENT).unwrap_or_else(|_| origin.clone());
    Self {
      cache,
      fetcher,
      root_document: RequestKey::new(Method::GET, &root),
    }
  }

  /// Same pipeline writing into `version`'s dynamic generation.
  pub fn for_version(&self, version: &str) -> Self {
    Self {
      cache: self.cache.for_version(version),
      fetcher: Arc::clone(&self.fetcher),
      root_document: self.root_document.clone(),
    }
  }

  pub fn version(&self) -> &str {
    self.cache.version()
  }

  #[cfg(test)]
  pub fn cache(&self) -> &CacheManager<S> {
    &self.cache
  }

  pub async fn handle(&self, request: &Request) -> Interception {
    if request.method != Method::GET || !request.is_http() {
      debug!(method = %request.method, url = %request.url, "bypassing pipeline");
      return Interception::Bypass;
    }
    Interception::Respond(self.respond(request).await)
  }

  async fn respond(&self, request: &Request) -> Served {
    let key = RequestKey::from(request);

    if let Some(response) = self.cached(&key).await {
      return Served::new(response, ResponseSource::Cache);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        let write_back = response
          .is_cacheable()
          .then(|| self.spawn_write_back(key, response.clone()));
        Served {
          response,
          source: ResponseSource::Network,
          write_back,
        }
      }
      Err(e) => {
        info!(url = %request.url, error = %e, "fetch failed, serving offline fallback");
        self.offline_fallback(request).await
      }
    }
  }

  fn spawn_write_back(&self, key: RequestKey, response: Response) -> JoinHandle<()> {
    let cache = self.cache.clone();
    tokio::task::spawn_blocking(move || {
      if let Err(e) = cache.store(&key, &response) {
        warn!(request = %key.description(), error = %e, "failed to cache response");
      }
    })
  }

  /// Look `key` up on the blocking pool. Failures read as a miss.
  async fn cached(&self, key: &RequestKey) -> Option<Response> {
    let cache = self.cache.clone();
    let owned = key.clone();

    match tokio::task::spawn_blocking(move || cache.lookup(&owned)).await {
      Ok(Ok(entry)) => entry.map(|entry| entry.response),
      Ok(Err(e)) => {
        warn!(request = %key.description(), error = %e, "cache lookup failed, treating as miss");
        None
      }
      Err(e) => {
        warn!(request = %key.description(), error = %e, "cache lookup task failed");
        None
      }
    }
  }

  async fn offline_fallback(&self, request: &Request) -> Served {
    if request.destination == Destination::Document {
      if let Some(response) = self.cached(&self.root_document).await {
        return Served::new(response, ResponseSource::OfflineFallback);
      }
    }
    Served::new(Response::offline(), ResponseSource::OfflineFallback)
  }
}
