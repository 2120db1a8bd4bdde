//! Fetch helpers that sit between consumers and the remote store.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::StoreError;

use super::keys::QueryKey;
use super::store::{CacheError, QueryCache};
use super::traits::CacheResult;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Cache(#[from] CacheError),
}

impl FetchError {
  /// Message suitable for an error banner
  pub fn message(&self) -> String {
    match self {
      Self::Store(e) => e.to_string(),
      Self::Cache(e) => e.to_string(),
    }
  }
}

/// Cache-first reads against a shared `QueryCache`.
#[derive(Clone)]
pub struct CacheLayer {
  cache: QueryCache,
}

impl CacheLayer {
  pub fn new(cache: QueryCache) -> Self {
    Self { cache }
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Fresh or optimistic entry: serve it without a request
  /// 2. Stale or missing entry: fetch from network
  /// 3. On network failure with a cached value, serve it (offline mode)
  pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<CacheResult<T>, FetchError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
  {
    match self.cache.get::<T>(key)? {
      Some(cached) if !cached.is_stale() => Ok(CacheResult::from_cache(cached.data)),
      _ => self.refetch(key, fetcher).await,
    }
  }

  /// Fetch from network regardless of cache state.
  ///
  /// A response overtaken by a local write while in flight is not stored;
  /// the newer cached value is returned instead.
  pub async fn refetch<T, F, Fut>(
    &self,
    key: &QueryKey,
    fetcher: F,
  ) -> Result<CacheResult<T>, FetchError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
  {
    let ticket = self.cache.begin_fetch(key);
    match fetcher().await {
      Ok(data) => {
        if self.cache.complete_fetch(ticket, &data)? {
          return Ok(CacheResult::from_network(data));
        }
        match self.cache.get::<T>(key)? {
          Some(cached) => Ok(CacheResult::from_cache(cached.data)),
          None => Ok(CacheResult::from_network(data)),
        }
      }
      Err(err) => {
        if let Some(cached) = self.cache.get::<T>(key)? {
          warn!(key = %key, error = %err, "network failed, serving cached value");
          return Ok(CacheResult::offline(cached.data));
        }
        debug!(key = %key, error = %err, "fetch failed with nothing cached");
        Err(err.into())
      }
    }
  }
}
