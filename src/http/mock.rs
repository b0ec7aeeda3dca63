//! Scripted fetcher for tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::fetcher::Fetcher;
use super::types::{Request, Response, ResponseType};
use crate::error::NetworkError;

/// Answers from a fixed route table. Unknown URLs get a 404; URLs marked as
/// failing (or every URL, when offline) reject like a dropped connection.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
  routes: HashMap<String, Response>,
  failing: Mutex<HashSet<String>>,
  offline: AtomicBool,
  calls: AtomicUsize,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(mut self, url: &str, response: Response) -> Self {
    self.routes.insert(url.to_string(), response);
    self
  }

  /// A 200 same-origin response.
  pub fn page(body: &str) -> Response {
    Response {
      status: 200,
      status_text: "OK".to_string(),
      headers: vec![("Content-Type".to_string(), "text/html".to_string())],
      body: body.as_bytes().to_vec(),
      kind: ResponseType::Basic,
    }
  }

  pub fn fail(&self, url: &str) {
    if let Ok(mut failing) = self.failing.lock() {
      failing.insert(url.to_string());
    }
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn answer(&self, request: &Request) -> Result<Response, NetworkError> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    let url = request.url.as_str();
    let failing = self
      .failing
      .lock()
      .map(|failing| failing.contains(url))
      .unwrap_or(true);
    if failing || self.offline.load(Ordering::SeqCst) {
      return Err(NetworkError::Offline);
    }

    Ok(self.routes.get(url).cloned().unwrap_or_else(|| Response {
      status: 404,
      status_text: "Not Found".to_string(),
      headers: Vec::new(),
      body: b"404 - File Not Found".to_vec(),
      kind: ResponseType::Basic,
    }))
  }
}

impl Fetcher for ScriptedFetcher {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, NetworkError>> + Send {
    let result = self.answer(request);
    async move {
      // Suspend once, like a real round trip would.
      tokio::task::yield_now().await;
      result
    }
  }
}
