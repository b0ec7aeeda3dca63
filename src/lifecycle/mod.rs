//! Install, activation and upgrade of a versioned offline layer.
//!
//! A new version installs by populating its static generation, then
//! activates by evicting every other generation and claiming open clients.
//! Until activation completes the previous version keeps serving.

mod controller;
mod machine;

pub use controller::{Controller, Effect};
pub use machine::{HostMessage, Registration, WorkerVersion};
#[cfg(test)]
pub use machine::WorkerState;
