//! Pure lifecycle state machine.
//!
//! `transition` never performs I/O: it maps the current registration and an
//! event to the next registration plus the actions the controller must run.
//! Actions that complete feed follow-up events back in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::cache::GenerationName;
use crate::sync::SyncTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
  Installing,
  Installed,
  Activating,
  Active,
}

impl WorkerState {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Active => "active",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerVersion {
  pub version: String,
  pub state: WorkerState,
}

impl WorkerVersion {
  fn new(version: &str, state: WorkerState) -> Self {
    Self {
      version: version.to_string(),
      state,
    }
  }
}

/// Which versions occupy the installing, waiting and active slots.
///
/// A newer version can be installing or waiting while an older one is
/// still active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
  pub installing: Option<WorkerVersion>,
  pub waiting: Option<WorkerVersion>,
  pub active: Option<WorkerVersion>,
  /// Version serving open clients, set once it has claimed them.
  pub controller: Option<String>,
}

impl Registration {
  pub fn active_version(&self) -> Option<&str> {
    self
      .active
      .as_ref()
      .filter(|w| w.state == WorkerState::Active)
      .map(|w| w.version.as_str())
  }

  fn knows(&self, version: &str) -> bool {
    [&self.installing, &self.waiting, &self.active]
      .into_iter()
      .flatten()
      .any(|w| w.version == version)
  }
}

/// Messages the host application may post to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
  /// A version was deployed and should start installing.
  Install { version: String },
  InstallSucceeded,
  InstallFailed,
  /// Skip the waiting period, from the install handler or a host message.
  SkipWaiting,
  /// Every client of the previous version went away.
  ClientsReleased,
  /// Stale generations are gone and clients are claimed.
  ActivationComplete,
  /// The platform asked for one tag's queue to be replayed.
  Sync(SyncTag),
  /// Back online; carries every tag registered at that moment.
  ConnectivityRestored(Vec<SyncTag>),
}

impl From<HostMessage> for LifecycleEvent {
  fn from(message: HostMessage) -> Self {
    match message {
      HostMessage::SkipWaiting => LifecycleEvent::SkipWaiting,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  PopulateStatic { version: String },
  /// Signal readiness to activate without waiting for old clients.
  SkipWaiting,
  EvictStale { keep: BTreeSet<String> },
  ClaimClients { version: String },
  Drain(SyncTag),
}

/// Generation names owned by `version`.
pub fn generations_for(version: &str) -> BTreeSet<String> {
  [
    GenerationName::static_for(version),
    GenerationName::dynamic_for(version),
  ]
  .iter()
  .map(ToString::to_string)
  .collect()
}

/// Compute the next registration and the actions to run. Events that make
/// no sense in the current state leave it unchanged and yield no actions.
pub fn transition(current: &Registration, event: &LifecycleEvent) -> (Registration, Vec<Action>) {
  let mut next = current.clone();

  let actions = match event {
    LifecycleEvent::Install { version } => {
      // A version still in the installing slot was interrupted mid-install
      // and populates again.
      let interrupted = current
        .installing
        .as_ref()
        .is_some_and(|w| &w.version == version);
      if current.knows(version) && !interrupted {
        Vec::new()
      } else {
        next.installing = Some(WorkerVersion::new(version, WorkerState::Installing));
        vec![Action::PopulateStatic {
          version: version.clone(),
        }]
      }
    }

    LifecycleEvent::InstallSucceeded => match next.installing.take() {
      Some(mut worker) => {
        worker.state = WorkerState::Installed;
        // A previously waiting version is superseded.
        next.waiting = Some(worker);
        vec![Action::SkipWaiting]
      }
      None => Vec::new(),
    },

    LifecycleEvent::InstallFailed => {
      next.installing = None;
      Vec::new()
    }

    LifecycleEvent::SkipWaiting | LifecycleEvent::ClientsReleased => match next.waiting.take() {
      Some(mut worker) => {
        worker.state = WorkerState::Activating;
        let version = worker.version.clone();
        next.active = Some(worker);
        vec![
          Action::EvictStale {
            keep: generations_for(&version),
          },
          Action::ClaimClients { version },
        ]
      }
      None => Vec::new(),
    },

    LifecycleEvent::ActivationComplete => match next.active.as_mut() {
      Some(worker) if worker.state == WorkerState::Activating => {
        worker.state = WorkerState::Active;
        next.controller = Some(worker.version.clone());
        Vec::new()
      }
      _ => Vec::new(),
    },

    LifecycleEvent::Sync(tag) => drains(current, std::slice::from_ref(tag)),
    LifecycleEvent::ConnectivityRestored(tags) => drains(current, tags),
  };

  (next, actions)
}

/// Queues are only replayed by an active version.
fn drains(current: &Registration, tags: &[SyncTag]) -> Vec<Action> {
  if current.active_version().is_none() {
    return Vec::new();
  }
  tags.iter().copied().map(Action::Drain).collect()
}
