//! Runs the actions the state machine asks for and persists the registration.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::machine::{transition, Action, HostMessage, LifecycleEvent, Registration};
use crate::cache::{CacheManager, CacheStorage};
use crate::error::{CachePopulationError, ReplayError};
use crate::features::Features;
use crate::http::{Fetcher, Request};
use crate::store::{read_json, write_json, KeyValueStore};
use crate::sync::{DrainReport, SyncTag};

/// Store key holding the serialized `Registration`.
pub const REGISTRATION_KEY: &str = "worker-registration";

/// Observable result of one executed action.
#[derive(Debug)]
pub enum Effect {
  Populated { version: String, entries: usize },
  PopulationFailed { version: String, error: CachePopulationError },
  /// Installed but held back until clients release or the host says skip.
  Waiting { version: String },
  Evicted(Vec<String>),
  Claimed { version: String },
  Drained(Result<DrainReport, ReplayError>),
}

pub struct Controller<K, S: CacheStorage, F> {
  store: Arc<K>,
  features: Arc<Features<K>>,
  cache: CacheManager<S>,
  fetcher: Arc<F>,
  manifest: Vec<Request>,
  auto_skip_waiting: bool,
  registration: Registration,
}

impl<K: KeyValueStore, S: CacheStorage, F: Fetcher> Controller<K, S, F> {
  /// Build a controller for `cache`'s version, resuming whatever
  /// registration was persisted by a previous run.
  pub fn new(
    store: Arc<K>,
    features: Arc<Features<K>>,
    cache: CacheManager<S>,
    fetcher: Arc<F>,
    manifest: Vec<Request>,
  ) -> Self {
    let registration = read_json(store.as_ref(), REGISTRATION_KEY);
    Self {
      store,
      features,
      cache,
      fetcher,
      manifest,
      auto_skip_waiting: true,
      registration,
    }
  }

  /// When disabled an installed version waits for `SKIP_WAITING` or for
  /// clients to be released.
  pub fn with_auto_skip_waiting(mut self, enabled: bool) -> Self {
    self.auto_skip_waiting = enabled;
    self
  }

  pub fn registration(&self) -> &Registration {
    &self.registration
  }

  /// Install the configured version. Fails when the static generation could
  /// not be populated; the previously active version stays in charge.
  pub async fn install(&mut self) -> Result<Vec<Effect>, CachePopulationError> {
    let version = self.cache.version().to_string();
    let effects = self.dispatch(LifecycleEvent::Install { version }).await;

    let mut kept = Vec::with_capacity(effects.len());
    for effect in effects {
      match effect {
        Effect::PopulationFailed { error, .. } => return Err(error),
        other => kept.push(other),
      }
    }
    Ok(kept)
  }

  pub async fn message(&mut self, message: HostMessage) -> Vec<Effect> {
    self.dispatch(message.into()).await
  }

  pub async fn sync(&mut self, tag: SyncTag) -> Vec<Effect> {
    self.dispatch(LifecycleEvent::Sync(tag)).await
  }

  /// Replay every registered queue after a reconnect.
  pub async fn reconnected(&mut self) -> Vec<Effect> {
    let tags = self.features.registered_tags().into_iter().collect();
    self.dispatch(LifecycleEvent::ConnectivityRestored(tags)).await
  }

  /// Feed an event through the state machine, running actions until no
  /// follow-up events remain.
  pub async fn dispatch(&mut self, event: LifecycleEvent) -> Vec<Effect> {
    let mut pending = VecDeque::from([event]);
    let mut effects = Vec::new();

    while let Some(event) = pending.pop_front() {
      let (next, actions) = transition(&self.registration, &event);
      if next == self.registration && actions.is_empty() {
        debug!(?event, "lifecycle event ignored in current state");
        continue;
      }

      debug!(?event, actions = actions.len(), "lifecycle transition");
      self.commit(next);

      for action in actions {
        if let Some(follow_up) = self.execute(action, &mut effects).await {
          pending.push_back(follow_up);
        }
      }
    }

    effects
  }

  fn commit(&mut self, next: Registration) {
    self.registration = next;
    if let Err(e) = write_json(self.store.as_ref(), REGISTRATION_KEY, &self.registration) {
      warn!(error = %e, "failed to persist registration");
    }
  }

  async fn execute(&mut self, action: Action, effects: &mut Vec<Effect>) -> Option<LifecycleEvent> {
    match action {
      Action::PopulateStatic { version } => {
        let cache = self.cache.for_version(&version);
        match cache.populate_static(self.fetcher.as_ref(), &self.manifest).await {
          Ok(entries) => {
            effects.push(Effect::Populated { version, entries });
            Some(LifecycleEvent::InstallSucceeded)
          }
          Err(error) => {
            warn!(%version, %error, "install failed");
            effects.push(Effect::PopulationFailed { version, error });
            Some(LifecycleEvent::InstallFailed)
          }
        }
      }

      Action::SkipWaiting => {
        if self.auto_skip_waiting {
          return Some(LifecycleEvent::SkipWaiting);
        }
        if let Some(waiting) = &self.registration.waiting {
          info!(version = %waiting.version, "installed, waiting to activate");
          effects.push(Effect::Waiting {
            version: waiting.version.clone(),
          });
        }
        None
      }

      Action::EvictStale { keep } => {
        match self.cache.evict_stale(&keep) {
          Ok(evicted) => effects.push(Effect::Evicted(evicted)),
          Err(e) => warn!(error = %e, "failed to evict stale generations"),
        }
        None
      }

      Action::ClaimClients { version } => {
        info!(%version, "activated and claimed clients");
        effects.push(Effect::Claimed { version });
        Some(LifecycleEvent::ActivationComplete)
      }

      Action::Drain(tag) => {
        effects.push(Effect::Drained(self.features.drain(tag)));
        None
      }
    }
  }
}
