//! Versioned response cache for offline support.
//!
//! This module provides the generation-based cache behind the request
//! pipeline:
//! - A static generation populated all-or-nothing from the install manifest
//! - A dynamic generation filled from successful same-origin responses
//! - Eviction of every generation not owned by the current version

mod manager;
#[cfg(test)]
mod memory;
mod storage;
mod traits;

pub use manager::CacheManager;
#[cfg(test)]
pub use memory::MemoryCacheStorage;
pub use storage::SqliteCacheStorage;
pub use traits::{CacheState, CacheStorage, GenerationName, RequestKey};
