//! Core traits and types for the caching system.

use serde::{de::DeserializeOwned, Serialize};

/// Trait for entities that can be merged into cached collections.
///
/// Implementors must provide a unique cache key and optionally an updated_at
/// timestamp used to refuse merging an older copy over a newer one.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this entity (e.g., application id)
  fn cache_key(&self) -> String;

  /// Last modification timestamp (ISO 8601).
  /// Returns None if the entity doesn't track modification time.
  fn updated_at(&self) -> Option<&str>;

  /// Entity type name used in log output (e.g., "application")
  fn entity_type() -> &'static str;
}

/// How far a cached value can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
  /// Last value confirmed by the server
  Fresh,
  /// Confirmed once, invalidated since; consumers should refetch
  Stale,
  /// Contains at least one optimistic write not yet confirmed or rejected
  Optimistic,
}

/// A typed read from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
  pub data: T,
  pub state: EntryState,
}

impl<T> Cached<T> {
  pub fn is_stale(&self) -> bool {
    self.state == EntryState::Stale
  }
}

/// Result from a fetch, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
    }
  }

  pub fn offline(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
    }
  }
}

/// Indicates where fetched data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Served from cache without a request
  Cache,
  /// Network failed, serving the last cached value
  Offline,
}
