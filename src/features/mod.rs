//! Per-feature user state: favorites, reading progress, and ratings.
//!
//! Each manager owns one namespaced key in the injected store and
//! read-modify-writes the whole blob on every mutation. There is no locking;
//! concurrent writers resolve as last-writer-wins.

mod favorites;
mod progress;
mod ratings;

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use crate::connectivity::Connectivity;
use crate::error::ReplayError;
use crate::store::KeyValueStore;
use crate::sync::{DrainReport, PendingQueue, Replay, SyncRegistry, SyncTag};

pub use favorites::Favorites;
pub use progress::Progress;
pub use ratings::Ratings;

/// Identifier of an item in the poem collection.
pub type ItemId = u32;

/// All feature managers over one store, constructed up front and handed to
/// whoever needs them.
pub struct Features<S> {
  pub favorites: Favorites<S>,
  pub progress: Progress<S>,
  pub ratings: Ratings<S>,
  registry: SyncRegistry<S>,
}

impl<S: KeyValueStore> Features<S> {
  pub fn new(store: Arc<S>, connectivity: Connectivity) -> Self {
    Self {
      favorites: Favorites::new(store.clone(), connectivity.clone()),
      progress: Progress::new(store.clone(), connectivity.clone()),
      ratings: Ratings::new(store.clone(), connectivity),
      registry: SyncRegistry::new(store),
    }
  }

  pub fn registered_tags(&self) -> BTreeSet<SyncTag> {
    self.registry.registered()
  }

  pub fn queue(&self, tag: SyncTag) -> &PendingQueue<S> {
    match tag {
      SyncTag::Favorites => self.favorites.recorder().queue(),
      SyncTag::Ratings => self.ratings.recorder().queue(),
      SyncTag::Progress => self.progress.recorder().queue(),
    }
  }

  /// Drain one tag's queue into its owning manager and unregister the tag on
  /// success. On failure the queue and the registration are both kept.
  pub fn drain(&self, tag: SyncTag) -> Result<DrainReport, ReplayError> {
    let replayer: &dyn Replay = match tag {
      SyncTag::Favorites => &self.favorites,
      SyncTag::Ratings => &self.ratings,
      SyncTag::Progress => &self.progress,
    };

    let report = self.queue(tag).drain_and_clear(replayer)?;

    if let Err(e) = self.registry.unregister(tag) {
      // Harmless: the next trigger drains an empty queue.
      warn!(%tag, error = %e, "failed to unregister drained sync tag");
    }
    Ok(report)
  }
}
