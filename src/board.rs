//! Status board: columns of applications and optimistic card moves.
//!
//! A move is applied to the cached collection before the backend confirms
//! it. A rejected move restores the card; a move that has been superseded by
//! a later gesture on the same card leaves the cache to that later gesture.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::api::api_types::{ApplicationFilter, ApplicationPatch, NewApplication};
use crate::api::types::{Application, ApplicationStatus, KANBAN_COLUMNS};
use crate::api::{RemoteStore, StoreError};
use crate::cache::{
  CacheError, CacheEvent, CacheLayer, CacheResult, CacheSource, FetchError, QueryCache, QueryKey,
  Snapshot, Subscription,
};
use crate::config::BoardConfig;

/// Where a card was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
  /// A column, i.e. a status
  Column(ApplicationStatus),
  /// Another card; the dragged card adopts its status
  Card(String),
}

impl Destination {
  /// Interpret a raw drop target id. Ids naming a status are columns,
  /// anything else is taken to be a card id.
  pub fn from_drop_id(id: &str) -> Self {
    match id.parse::<ApplicationStatus>() {
      Ok(status) => Self::Column(status),
      Err(_) => Self::Card(id.to_string()),
    }
  }
}

/// End of a drag gesture as reported by the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragEnd {
  pub dragged_id: String,
  /// `None` when dropped outside any target
  pub over_id: Option<String>,
}

/// Why a move did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
  NoTarget,
  NotLoaded,
  UnknownCard,
  UnknownTarget,
  SameStatus,
}

#[derive(Debug)]
pub enum MoveOutcome {
  NoOp(NoOpReason),
  /// The backend accepted the new status
  Confirmed(Application),
  /// The backend rejected the move and the card was restored
  RolledBack(StoreError),
  /// A later gesture on the same card took over before this one resolved
  Superseded,
  /// The cached board could not be read or written
  Failed(CacheError),
}

/// Loading state of the board collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
  Idle,
  Loading,
  Ready,
  Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
  pub status: ApplicationStatus,
  pub cards: Vec<Application>,
}

/// Dashboard counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
  pub total: usize,
  pub applied: usize,
  pub interviewing: usize,
  pub offers: usize,
}

/// Overlapping gestures on one card
#[derive(Debug, Clone, Copy)]
struct GestureChain {
  latest: u64,
  /// Last status the backend is known to hold for the card
  settled: ApplicationStatus,
  /// A gesture on this card was still unresolved when a later one started
  overlapped: bool,
}

/// How a gesture ended relative to others on the same card
enum Turn {
  Latest(GestureChain),
  Superseded,
}

#[derive(Debug)]
struct BoardState {
  load: LoadState,
  error: Option<String>,
  gestures: HashMap<String, GestureChain>,
  next_gesture: u64,
}

pub struct Board {
  store: Arc<dyn RemoteStore>,
  layer: CacheLayer,
  config: BoardConfig,
  filter: ApplicationFilter,
  key: QueryKey,
  state: Mutex<BoardState>,
  revision: Arc<AtomicU64>,
  /// Keeps detail entries read through this board alive until it is dropped
  details: Mutex<HashMap<String, Subscription>>,
  _subscription: Subscription,
}

impl Board {
  pub fn new(store: Arc<dyn RemoteStore>, cache: QueryCache, config: BoardConfig) -> Self {
    Self::filtered(store, cache, config, ApplicationFilter::default())
  }

  /// A board over the applications matching `filter`
  pub fn filtered(
    store: Arc<dyn RemoteStore>,
    cache: QueryCache,
    config: BoardConfig,
    filter: ApplicationFilter,
  ) -> Self {
    let key = QueryKey::Applications(filter.clone());
    let revision = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&revision);
    let subscription = cache.subscribe(&key, move |_: &CacheEvent| {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    Self {
      store,
      layer: CacheLayer::new(cache),
      config,
      filter,
      key,
      state: Mutex::new(BoardState {
        load: LoadState::Idle,
        error: None,
        gestures: HashMap::new(),
        next_gesture: 0,
      }),
      revision,
      details: Mutex::default(),
      _subscription: subscription,
    }
  }

  fn lock(&self) -> MutexGuard<'_, BoardState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn cache(&self) -> &QueryCache {
    self.layer.cache()
  }

  #[allow(dead_code)]
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Bumped on every change to the board collection
  #[allow(dead_code)]
  pub fn revision(&self) -> u64 {
    self.revision.load(Ordering::SeqCst)
  }

  #[allow(dead_code)]
  pub fn load_state(&self) -> LoadState {
    self.lock().load.clone()
  }

  pub fn error(&self) -> Option<String> {
    self.lock().error.clone()
  }

  #[allow(dead_code)]
  pub fn dismiss_error(&self) {
    self.lock().error = None;
  }

  fn set_error(&self, message: String) {
    self.lock().error = Some(message);
  }

  /// Fetch the collection from the backend.
  pub async fn load(&self) -> Result<CacheSource, FetchError> {
    self.lock().load = LoadState::Loading;
    let store = Arc::clone(&self.store);
    let filter = self.filter.clone();
    let result = self
      .layer
      .refetch(&self.key, || async move { store.list_applications(&filter).await })
      .await;
    self.finish_load(result)
  }

  /// Fetch the collection only if it is absent or stale.
  #[allow(dead_code)]
  pub async fn ensure_fresh(&self) -> Result<CacheSource, FetchError> {
    let store = Arc::clone(&self.store);
    let filter = self.filter.clone();
    let result = self
      .layer
      .fetch(&self.key, || async move { store.list_applications(&filter).await })
      .await;
    self.finish_load(result)
  }

  fn finish_load(
    &self,
    result: Result<CacheResult<Vec<Application>>, FetchError>,
  ) -> Result<CacheSource, FetchError> {
    let mut state = self.lock();
    match result {
      Ok(fetched) => {
        debug!(key = %self.key, count = fetched.data.len(), source = ?fetched.source, "board loaded");
        state.load = LoadState::Ready;
        Ok(fetched.source)
      }
      Err(err) => {
        state.load = LoadState::Error(err.message());
        Err(err)
      }
    }
  }

  /// Cached applications in backend order; empty before the first load.
  pub fn applications(&self) -> Result<Vec<Application>, CacheError> {
    Ok(
      self
        .cache()
        .get::<Vec<Application>>(&self.key)?
        .map(|cached| cached.data)
        .unwrap_or_default(),
    )
  }

  /// Visible columns in pipeline order with their cards.
  pub fn columns(&self) -> Result<Vec<Column>, CacheError> {
    let apps = self.applications()?;
    Ok(
      KANBAN_COLUMNS
        .iter()
        .copied()
        .filter(|status| !self.config.is_hidden(*status))
        .map(|status| Column {
          status,
          cards: apps.iter().filter(|a| a.status == status).cloned().collect(),
        })
        .collect(),
    )
  }

  pub fn summary(&self) -> Result<Summary, CacheError> {
    let apps = self.applications()?;
    let count = |status: ApplicationStatus| apps.iter().filter(|a| a.status == status).count();
    Ok(Summary {
      total: apps.len(),
      applied: count(ApplicationStatus::Applied),
      interviewing: count(ApplicationStatus::Interview),
      offers: count(ApplicationStatus::Offer),
    })
  }

  /// Single application, served from cache when fresh.
  pub async fn detail(&self, id: &str) -> Result<Application, FetchError> {
    self.watch_detail(id);
    let store = Arc::clone(&self.store);
    let owned = id.to_string();
    let result = self
      .layer
      .fetch(&QueryKey::application(id), || async move {
        store.get_application(&owned).await
      })
      .await?;
    Ok(result.data)
  }

  fn watch_detail(&self, id: &str) {
    let mut details = self.details.lock().unwrap_or_else(PoisonError::into_inner);
    if details.contains_key(id) {
      return;
    }
    let counter = Arc::clone(&self.revision);
    let subscription = self
      .cache()
      .subscribe(&QueryKey::application(id), move |_: &CacheEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
      });
    details.insert(id.to_string(), subscription);
  }

  /// Handle the end of a drag gesture.
  pub async fn on_drag_end(&self, event: DragEnd) -> MoveOutcome {
    match event.over_id {
      Some(over) => {
        self
          .move_card(&event.dragged_id, Destination::from_drop_id(&over))
          .await
      }
      None => MoveOutcome::NoOp(NoOpReason::NoTarget),
    }
  }

  /// Move a card to `destination`, optimistically.
  pub async fn move_card(&self, id: &str, destination: Destination) -> MoveOutcome {
    let apps = match self.cache().get::<Vec<Application>>(&self.key) {
      Ok(Some(cached)) => cached.data,
      Ok(None) => return MoveOutcome::NoOp(NoOpReason::NotLoaded),
      Err(err) => {
        self.set_error(err.to_string());
        return MoveOutcome::Failed(err);
      }
    };

    let Some(current) = apps.iter().find(|a| a.id == id).map(|a| a.status) else {
      return MoveOutcome::NoOp(NoOpReason::UnknownCard);
    };
    let target = match &destination {
      Destination::Column(status) => *status,
      Destination::Card(other) => match apps.iter().find(|a| &a.id == other) {
        Some(card) => card.status,
        None => return MoveOutcome::NoOp(NoOpReason::UnknownTarget),
      },
    };
    if target == current {
      return MoveOutcome::NoOp(NoOpReason::SameStatus);
    }

    let gesture = {
      let mut state = self.lock();
      state.next_gesture += 1;
      let gesture = state.next_gesture;
      state
        .gestures
        .entry(id.to_string())
        .and_modify(|chain| {
          chain.latest = gesture;
          chain.overlapped = true;
        })
        .or_insert(GestureChain {
          latest: gesture,
          settled: current,
          overlapped: false,
        });
      gesture
    };

    let snapshot = self.cache().snapshot(&self.key);
    let patched = self
      .cache()
      .patch_optimistic::<Vec<Application>, _>(&self.key, &snapshot, set_status(id, target));
    let patched_version = match patched {
      Ok(version) => version,
      Err(err) => {
        self.finish_gesture(id, gesture, None);
        self.set_error(err.to_string());
        return MoveOutcome::Failed(err);
      }
    };

    info!(application = id, from = %current, to = %target, "moving card");
    let result = self
      .store
      .update_application(id, &ApplicationPatch::status(target))
      .await;

    let confirmed = result.as_ref().ok().map(|app| app.status);
    let chain = match self.finish_gesture(id, gesture, confirmed) {
      Turn::Latest(chain) => chain,
      Turn::Superseded => {
        debug!(
          application = id,
          gesture,
          accepted = confirmed.is_some(),
          "move superseded by a later gesture"
        );
        self.cache().confirm(&self.key, &snapshot);
        // What the backend holds for the card is no longer known
        self.cache().invalidate(&self.key);
        return MoveOutcome::Superseded;
      }
    };

    match result {
      Ok(updated) => {
        self.cache().confirm(&self.key, &snapshot);
        self.cache().invalidate(&self.key);
        self.cache().invalidate(&QueryKey::application(id));
        info!(application = id, status = %updated.status, "move confirmed");
        MoveOutcome::Confirmed(updated)
      }
      Err(err) => {
        self.revert(id, &chain, &snapshot, patched_version);
        warn!(application = id, error = %err, "move rejected, card restored");
        self.set_error(format!("Failed to move application: {}", err));
        MoveOutcome::RolledBack(err)
      }
    }
  }

  /// Close the chain if `gesture` is still the latest for `id`. An earlier
  /// gesture accepted by the backend moves the chain's settled status.
  fn finish_gesture(
    &self,
    id: &str,
    gesture: u64,
    confirmed: Option<ApplicationStatus>,
  ) -> Turn {
    let mut state = self.lock();
    match state.gestures.get_mut(id) {
      Some(chain) if chain.latest == gesture => {
        let chain = *chain;
        state.gestures.remove(id);
        Turn::Latest(chain)
      }
      Some(chain) => {
        if let Some(status) = confirmed {
          chain.settled = status;
        }
        Turn::Superseded
      }
      None => Turn::Superseded,
    }
  }

  fn revert(
    &self,
    id: &str,
    chain: &GestureChain,
    snapshot: &Snapshot,
    patched_version: Option<u64>,
  ) {
    let cache = self.cache();
    if !chain.overlapped && patched_version.is_some() && cache.version(&self.key) == patched_version {
      cache.rollback(&self.key, snapshot);
      return;
    }

    // Other writes landed since the patch, or the snapshot holds an earlier
    // gesture's unconfirmed status; only undo this card
    let restore = set_status(id, chain.settled);
    if let Err(err) = cache.patch::<Vec<Application>, _>(&self.key, restore) {
      warn!(application = id, error = %err, "failed to restore card");
    }
    cache.confirm(&self.key, snapshot);
    if chain.overlapped {
      cache.invalidate(&self.key);
    }
  }

  /// Partial update without an optimistic step; the confirmed record is
  /// merged into the cache.
  pub async fn update(&self, id: &str, patch: ApplicationPatch) -> Result<Application, FetchError> {
    if patch.is_empty() {
      return self.detail(id).await;
    }
    let updated = self.store.update_application(id, &patch).await.map_err(|err| {
      self.set_error(format!("Failed to update application: {}", err));
      err
    })?;
    info!(application = id, "application updated");
    self.merge_confirmed(&updated)?;
    Ok(updated)
  }

  pub async fn update_notes(&self, id: &str, notes: &str) -> Result<Application, FetchError> {
    self.update(id, ApplicationPatch::notes(notes)).await
  }

  /// Create a company, posting and application in one step.
  pub async fn create(&self, body: NewApplication) -> Result<Application, FetchError> {
    let created = self.store.create_application(&body).await.map_err(|err| {
      self.set_error(format!("Failed to create application: {}", err));
      err
    })?;
    info!(application = %created.id, company = %body.company_name, "application created");
    self.merge_confirmed(&created)?;
    Ok(created)
  }

  fn merge_confirmed(&self, app: &Application) -> Result<(), CacheError> {
    self.cache().upsert(&self.key, app)?;
    let detail = QueryKey::application(&app.id);
    if self.cache().get_raw(&detail).is_some() {
      self.cache().set(&detail, app)?;
    }
    Ok(())
  }
}

fn set_status(id: &str, status: ApplicationStatus) -> impl FnOnce(&mut Vec<Application>) + '_ {
  move |apps| {
    if let Some(app) = apps.iter_mut().find(|a| a.id == id) {
      app.status = status;
    }
  }
}
