//! Binary online/offline signal shared between the host and the worker.

use std::sync::Arc;
use tokio::sync::watch;

/// Current connectivity plus a change feed.
///
/// Clones share the same signal. Managers read it synchronously to decide
/// whether a mutation must also be queued; the worker subscribes to it to
/// trigger queue draining on reconnect.
#[derive(Debug, Clone)]
pub struct Connectivity {
  tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Record a transition. Subscribers are only woken when the value changes.
  pub fn set_online(&self, online: bool) {
    self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

impl Default for Connectivity {
  fn default() -> Self {
    Self::new(true)
  }
}
