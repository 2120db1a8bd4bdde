//! Keyed in-memory cache shared by every data consumer.
//!
//! This module provides:
//! - A `QueryCache` of last-known values per `QueryKey`
//! - Snapshot/patch/rollback primitives for optimistic writes
//! - Fetch tickets so a slow refetch never overwrites a newer write
//! - A `CacheLayer` for cache-first reads with offline fallback

mod keys;
mod layer;
mod store;
mod traits;

pub use keys::QueryKey;
pub use layer::{CacheLayer, FetchError};
pub use store::{CacheError, CacheEvent, QueryCache, Snapshot, Subscription};
pub use traits::{CacheResult, CacheSource};

#[cfg(test)]
pub use store::CacheEventKind;
#[cfg(test)]
pub use traits::EntryState;
