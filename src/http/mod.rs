//! Request/response snapshots and the network fetcher seam.

mod fetcher;
#[cfg(test)]
mod mock;
mod types;

pub use fetcher::{Fetcher, HttpFetcher};
#[cfg(test)]
pub use mock::ScriptedFetcher;
pub use types::{Destination, Request, Response, ResponseType};
