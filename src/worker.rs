//! The worker task.
//!
//! Owns the lifecycle controller and the request pipeline. The host talks to
//! it only through a `WorkerHandle`; every request carries a oneshot reply.
//! Fetches run on their own tasks so a slow network never blocks lifecycle
//! events.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::connectivity::Connectivity;
use crate::error::{CachePopulationError, NetworkError, WorkerGone};
use crate::http::{Fetcher, Request};
use crate::lifecycle::{Controller, Effect, HostMessage, Registration};
use crate::pipeline::{Interception, Pipeline, ResponseSource, Served};
use crate::store::KeyValueStore;
use crate::sync::SyncTag;

/// Requests the host can send to the worker.
pub enum WorkerEvent {
  Fetch {
    request: Request,
    reply: oneshot::Sender<Result<Served, NetworkError>>,
  },
  Install {
    reply: oneshot::Sender<Result<Vec<Effect>, CachePopulationError>>,
  },
  Message {
    message: HostMessage,
    reply: oneshot::Sender<Vec<Effect>>,
  },
  /// Replay one tag, or every registered tag when `None`.
  Sync {
    tag: Option<SyncTag>,
    reply: oneshot::Sender<Vec<Effect>>,
  },
  Registration {
    reply: oneshot::Sender<Registration>,
  },
}

/// Cloneable sender side of the worker.
#[derive(Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
  pub async fn fetch(&self, request: Request) -> Result<Result<Served, NetworkError>, WorkerGone> {
    self
      .call(|reply| WorkerEvent::Fetch { request, reply })
      .await
  }

  pub async fn install(&self) -> Result<Result<Vec<Effect>, CachePopulationError>, WorkerGone> {
    self.call(|reply| WorkerEvent::Install { reply }).await
  }

  pub async fn message(&self, message: HostMessage) -> Result<Vec<Effect>, WorkerGone> {
    self
      .call(|reply| WorkerEvent::Message { message, reply })
      .await
  }

  pub async fn sync(&self, tag: Option<SyncTag>) -> Result<Vec<Effect>, WorkerGone> {
    self.call(|reply| WorkerEvent::Sync { tag, reply }).await
  }

  pub async fn registration(&self) -> Result<Registration, WorkerGone> {
    self.call(|reply| WorkerEvent::Registration { reply }).await
  }

  async fn call<T>(&self, event: impl FnOnce(oneshot::Sender<T>) -> WorkerEvent) -> Result<T, WorkerGone> {
    let (reply, rx) = oneshot::channel();
    self.tx.send(event(reply)).map_err(|_| WorkerGone)?;
    rx.await.map_err(|_| WorkerGone)
  }
}

struct Worker<K, S: CacheStorage, F: Fetcher> {
  controller: Controller<K, S, F>,
  pipeline: Arc<Pipeline<S, F>>,
  fetcher: Arc<F>,
  rx: mpsc::UnboundedReceiver<WorkerEvent>,
  online: watch::Receiver<bool>,
}

/// Start the worker on the current runtime.
pub fn spawn<K, S, F>(
  controller: Controller<K, S, F>,
  pipeline: Pipeline<S, F>,
  fetcher: Arc<F>,
  connectivity: &Connectivity,
) -> (WorkerHandle, JoinHandle<()>)
where
  K: KeyValueStore + 'static,
  S: CacheStorage,
  F: Fetcher,
{
  let (tx, rx) = mpsc::unbounded_channel();
  let worker = Worker {
    controller,
    pipeline: Arc::new(pipeline),
    fetcher,
    rx,
    online: connectivity.subscribe(),
  };

  (WorkerHandle { tx }, tokio::spawn(worker.run()))
}

impl<K, S, F> Worker<K, S, F>
where
  K: KeyValueStore + 'static,
  S: CacheStorage,
  F: Fetcher,
{
  async fn run(mut self) {
    let mut watching = true;

    loop {
      tokio::select! {
        // Connectivity first, so a reconnect is replayed before any request
        // queued behind it.
        biased;

        changed = self.online.changed(), if watching => match changed {
          Ok(()) => {
            let online = *self.online.borrow_and_update();
            if online {
              info!("connectivity restored, replaying queued mutations");
              let effects = self.controller.reconnected().await;
              log_failed_drains(&effects);
            } else {
              info!("connectivity lost");
            }
          }
          Err(_) => watching = false,
        },

        event = self.rx.recv() => match event {
          Some(event) => self.handle(event).await,
          None => break,
        },
      }
    }

    debug!("worker stopped");
  }

  async fn handle(&mut self, event: WorkerEvent) {
    match event {
      WorkerEvent::Fetch { request, reply } => {
        let pipeline = self.controlling_pipeline();
        let fetcher = Arc::clone(&self.fetcher);

        tokio::spawn(async move {
          let result = intercept(pipeline.as_deref(), fetcher.as_ref(), &request).await;
          let _ = reply.send(result);
        });
      }

      WorkerEvent::Install { reply } => {
        let _ = reply.send(self.controller.install().await);
      }

      WorkerEvent::Message { message, reply } => {
        let _ = reply.send(self.controller.message(message).await);
      }

      WorkerEvent::Sync { tag, reply } => {
        let effects = match tag {
          Some(tag) => self.controller.sync(tag).await,
          None => self.controller.reconnected().await,
        };
        log_failed_drains(&effects);
        let _ = reply.send(effects);
      }

      WorkerEvent::Registration { reply } => {
        let _ = reply.send(self.controller.registration().clone());
      }
    }
  }

  /// Pipeline of the version controlling clients, or `None` while no version
  /// does. Writes follow the controller across activations.
  fn controlling_pipeline(&mut self) -> Option<Arc<Pipeline<S, F>>> {
    let version = self.controller.registration().controller.as_deref()?;
    if self.pipeline.version() != version {
      debug!(%version, "pointing pipeline at controlling version");
      self.pipeline = Arc::new(self.pipeline.for_version(version));
    }
    Some(Arc::clone(&self.pipeline))
  }
}

/// Requests from clients the worker does not control yet, and requests the
/// pipeline bypasses, go straight to the network.
async fn intercept<S: CacheStorage, F: Fetcher>(
  pipeline: Option<&Pipeline<S, F>>,
  fetcher: &F,
  request: &Request,
) -> Result<Served, NetworkError> {
  match pipeline {
    Some(pipeline) => {
      if let Interception::Respond(served) = pipeline.handle(request).await {
        return Ok(served);
      }
    }
    None => debug!(url = %request.url, "client not controlled, passing through"),
  }

  let response = fetcher.fetch(request).await?;
  Ok(Served::new(response, ResponseSource::Network))
}

fn log_failed_drains(effects: &[Effect]) {
  for effect in effects {
    if let Effect::Drained(Err(e)) = effect {
      warn!(tag = %e.tag, error = %e, "replay failed, keeping queue for retry");
    }
  }
}
