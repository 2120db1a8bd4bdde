//! The user's profile, read cache-first and saved with a full refetch.

use std::sync::Arc;

use tracing::info;

use crate::api::api_types::ProfileUpdate;
use crate::api::types::Profile;
use crate::api::RemoteStore;
use crate::cache::{CacheLayer, CacheResult, FetchError, QueryKey, Subscription};

/// Split a comma separated skill list, dropping blanks.
pub fn parse_skills(csv: &str) -> Vec<String> {
  csv
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}

/// Profile reads and writes. The cached profile lives as long as this value.
pub struct ProfileEditor {
  store: Arc<dyn RemoteStore>,
  layer: CacheLayer,
  _subscription: Subscription,
}

impl ProfileEditor {
  pub fn new(store: Arc<dyn RemoteStore>, layer: CacheLayer) -> Self {
    let subscription = layer.cache().subscribe(&QueryKey::Profile, |_| {});
    Self {
      store,
      layer,
      _subscription: subscription,
    }
  }

  pub async fn get(&self) -> Result<CacheResult<Profile>, FetchError> {
    let store = Arc::clone(&self.store);
    self
      .layer
      .fetch(&QueryKey::Profile, || async move { store.get_profile().await })
      .await
  }

  /// Save `update` and return the profile as the backend now holds it.
  pub async fn update(&self, update: &ProfileUpdate) -> Result<Profile, FetchError> {
    if update.is_empty() {
      return Ok(self.get().await?.data);
    }
    let saved = self.store.update_profile(update).await?;
    info!(profile = %saved.id, "profile saved");
    self.layer.cache().invalidate(&QueryKey::Profile);
    Ok(self.get().await?.data)
  }
}
