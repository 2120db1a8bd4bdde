//! In-memory query cache with optimistic-write primitives.
//!
//! Values are held as `serde_json::Value` so a single store can hold every
//! collection type, and so a snapshot restores exactly the bytes it captured.
//! All mutations happen under a short lock that is never held across an
//! await; listeners run after the lock is released.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

use super::keys::QueryKey;
use super::traits::{Cacheable, Cached, EntryState};

/// Failure to read or write a cached value with the requested type.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cached value for {key} has an unexpected shape: {source}")]
  Decode {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to encode value for {key}: {source}")]
  Encode {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}

/// What happened to an entry, delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
  Set,
  Patched,
  Invalidated,
  RolledBack,
  Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
  pub key: QueryKey,
  pub kind: CacheEventKind,
  /// Entry version after the change
  pub version: u64,
}

pub type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Value of an entry captured for a later rollback.
///
/// A snapshot restores at most once; clones share that flag, so rolling
/// back twice with the same token is a no-op.
#[derive(Debug, Clone)]
pub struct Snapshot {
  id: u64,
  key: QueryKey,
  value: Option<Value>,
  stale: bool,
  consumed: Arc<AtomicBool>,
}

/// Permission to write a refetched value, issued before the request starts.
#[derive(Debug, Clone)]
pub struct FetchTicket {
  key: QueryKey,
  version: Option<u64>,
}

struct Entry {
  value: Value,
  version: u64,
  stale: bool,
  /// Snapshot ids of optimistic writes not yet confirmed or rolled back
  pending: BTreeSet<u64>,
}

impl Entry {
  fn state(&self) -> EntryState {
    if !self.pending.is_empty() {
      EntryState::Optimistic
    } else if self.stale {
      EntryState::Stale
    } else {
      EntryState::Fresh
    }
  }
}

#[derive(Default)]
struct CacheInner {
  entries: HashMap<QueryKey, Entry>,
  listeners: HashMap<QueryKey, Vec<(u64, Listener)>>,
  next_version: u64,
  next_id: u64,
}

impl CacheInner {
  fn bump_version(&mut self) -> u64 {
    self.next_version += 1;
    self.next_version
  }

  fn bump_id(&mut self) -> u64 {
    self.next_id += 1;
    self.next_id
  }

  fn listeners_for(&self, key: &QueryKey) -> Vec<Listener> {
    self
      .listeners
      .get(key)
      .map(|ls| ls.iter().map(|(_, l)| Arc::clone(l)).collect())
      .unwrap_or_default()
  }
}

/// Keyed cache shared by the board, the task orchestrator and their readers.
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Clone, Default)]
pub struct QueryCache {
  inner: Arc<Mutex<CacheInner>>,
}

fn decode<T: DeserializeOwned>(key: &QueryKey, value: Value) -> Result<T, CacheError> {
  serde_json::from_value(value).map_err(|source| CacheError::Decode {
    key: key.description(),
    source,
  })
}

fn encode<T: Serialize>(key: &QueryKey, value: &T) -> Result<Value, CacheError> {
  serde_json::to_value(value).map_err(|source| CacheError::Encode {
    key: key.description(),
    source,
  })
}

impl QueryCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, CacheInner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn notify(listeners: Vec<Listener>, event: CacheEvent) {
    trace!(key = %event.key, kind = ?event.kind, version = event.version, "cache event");
    for listener in listeners {
      listener(&event);
    }
  }

  /// Last known value for `key`, without touching the network.
  pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<Cached<T>>, CacheError> {
    let (value, state) = {
      let inner = self.lock();
      match inner.entries.get(key) {
        Some(entry) => (entry.value.clone(), entry.state()),
        None => return Ok(None),
      }
    };
    Ok(Some(Cached {
      data: decode(key, value)?,
      state,
    }))
  }

  /// Raw stored value, as captured by snapshots
  pub fn get_raw(&self, key: &QueryKey) -> Option<Value> {
    self.lock().entries.get(key).map(|e| e.value.clone())
  }

  pub fn state(&self, key: &QueryKey) -> Option<EntryState> {
    self.lock().entries.get(key).map(Entry::state)
  }

  pub fn version(&self, key: &QueryKey) -> Option<u64> {
    self.lock().entries.get(key).map(|e| e.version)
  }

  /// Replace the entry unconditionally. Outstanding optimistic writes stay
  /// registered until they are confirmed or rolled back.
  pub fn set<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<u64, CacheError> {
    let value = encode(key, value)?;
    let (version, listeners) = {
      let mut inner = self.lock();
      let version = inner.bump_version();
      let entry = inner.entries.entry(key.clone()).or_insert_with(|| Entry {
        value: Value::Null,
        version,
        stale: false,
        pending: BTreeSet::new(),
      });
      entry.value = value;
      entry.version = version;
      entry.stale = false;
      (version, inner.listeners_for(key))
    };
    debug!(key = %key, version, "cache set");
    Self::notify(
      listeners,
      CacheEvent {
        key: key.clone(),
        kind: CacheEventKind::Set,
        version,
      },
    );
    Ok(version)
  }

  /// Apply `updater` to the current value in place and return the previous
  /// value. Absent entries are left absent and yield `None`.
  pub fn patch<T, F>(&self, key: &QueryKey, updater: F) -> Result<Option<Value>, CacheError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T),
  {
    Ok(self.apply_patch(key, None, updater)?.map(|(previous, _)| previous))
  }

  /// Patch the entry on behalf of the write captured by `snapshot`. Until
  /// the write is confirmed or rolled back, reads report
  /// `EntryState::Optimistic`. Returns the entry version after the patch.
  pub fn patch_optimistic<T, F>(
    &self,
    key: &QueryKey,
    snapshot: &Snapshot,
    updater: F,
  ) -> Result<Option<u64>, CacheError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T),
  {
    Ok(
      self
        .apply_patch(key, Some(snapshot.id), updater)?
        .map(|(_, version)| version),
    )
  }

  fn apply_patch<T, F>(
    &self,
    key: &QueryKey,
    pending: Option<u64>,
    updater: F,
  ) -> Result<Option<(Value, u64)>, CacheError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T),
  {
    let (previous, version, listeners) = {
      let mut inner = self.lock();
      let current = match inner.entries.get(key) {
        Some(entry) => entry.value.clone(),
        None => return Ok(None),
      };

      let mut typed: T = decode(key, current.clone())?;
      updater(&mut typed);
      let next = encode(key, &typed)?;

      let version = inner.bump_version();
      let Some(entry) = inner.entries.get_mut(key) else {
        return Ok(None);
      };
      entry.value = next;
      entry.version = version;
      if let Some(id) = pending {
        entry.pending.insert(id);
      }
      (current, version, inner.listeners_for(key))
    };
    debug!(key = %key, version, optimistic = pending.is_some(), "cache patch");
    Self::notify(
      listeners,
      CacheEvent {
        key: key.clone(),
        kind: CacheEventKind::Patched,
        version,
      },
    );
    Ok(Some((previous, version)))
  }

  /// Mark the entry stale so its consumer refetches on next read.
  pub fn invalidate(&self, key: &QueryKey) -> bool {
    let (version, listeners) = {
      let mut inner = self.lock();
      let Some(entry) = inner.entries.get_mut(key) else {
        return false;
      };
      entry.stale = true;
      let version = entry.version;
      (version, inner.listeners_for(key))
    };
    debug!(key = %key, "cache invalidate");
    Self::notify(
      listeners,
      CacheEvent {
        key: key.clone(),
        kind: CacheEventKind::Invalidated,
        version,
      },
    );
    true
  }

  /// Capture the current value for a later `rollback`.
  pub fn snapshot(&self, key: &QueryKey) -> Snapshot {
    let mut inner = self.lock();
    let id = inner.bump_id();
    let (value, stale) = match inner.entries.get(key) {
      Some(entry) => (Some(entry.value.clone()), entry.stale),
      None => (None, false),
    };
    Snapshot {
      id,
      key: key.clone(),
      value,
      stale,
      consumed: Arc::default(),
    }
  }

  /// Restore the value captured by `snapshot`.
  ///
  /// Returns `true` if the entry was restored. A token is honored once; later
  /// calls with the same token are no-ops. An entry torn down since the
  /// snapshot is not resurrected.
  pub fn rollback(&self, key: &QueryKey, snapshot: &Snapshot) -> bool {
    if *key != snapshot.key {
      return false;
    }

    let (version, listeners) = {
      let mut inner = self.lock();
      if snapshot.consumed.swap(true, Ordering::SeqCst) {
        return false;
      }

      let version = inner.bump_version();
      match (&snapshot.value, inner.entries.contains_key(key)) {
        (Some(value), true) => {
          if let Some(entry) = inner.entries.get_mut(key) {
            entry.value = value.clone();
            entry.stale |= snapshot.stale;
            entry.version = version;
            entry.pending.remove(&snapshot.id);
          }
        }
        (None, true) => {
          inner.entries.remove(key);
        }
        (_, false) => return false,
      }
      (version, inner.listeners_for(key))
    };
    debug!(key = %key, version, "cache rollback");
    Self::notify(
      listeners,
      CacheEvent {
        key: key.clone(),
        kind: CacheEventKind::RolledBack,
        version,
      },
    );
    true
  }

  /// Release the optimistic write registered with `snapshot` without
  /// changing the value.
  pub fn confirm(&self, key: &QueryKey, snapshot: &Snapshot) {
    let mut inner = self.lock();
    if let Some(entry) = inner.entries.get_mut(key) {
      entry.pending.remove(&snapshot.id);
    }
  }

  /// Start a refetch of `key`.
  pub fn begin_fetch(&self, key: &QueryKey) -> FetchTicket {
    FetchTicket {
      key: key.clone(),
      version: self.version(key),
    }
  }

  /// Store a refetched value if nothing was written since `ticket` was
  /// issued and no optimistic write is outstanding. Returns whether the value
  /// was applied; a refused value leaves the entry as it was.
  pub fn complete_fetch<T: Serialize>(
    &self,
    ticket: FetchTicket,
    value: &T,
  ) -> Result<bool, CacheError> {
    let encoded = encode(&ticket.key, value)?;
    let (version, listeners) = {
      let mut inner = self.lock();
      let current = inner
        .entries
        .get(&ticket.key)
        .map(|e| (e.version, e.pending.is_empty()));
      match current {
        Some((version, idle)) if Some(version) == ticket.version && idle => {}
        None if ticket.version.is_none() => {}
        _ => {
          debug!(key = %ticket.key, "discarding refetch overtaken by a newer write");
          return Ok(false);
        }
      }

      let version = inner.bump_version();
      inner.entries.insert(
        ticket.key.clone(),
        Entry {
          value: encoded,
          version,
          stale: false,
          pending: BTreeSet::new(),
        },
      );
      (version, inner.listeners_for(&ticket.key))
    };
    Self::notify(
      listeners,
      CacheEvent {
        key: ticket.key,
        kind: CacheEventKind::Set,
        version,
      },
    );
    Ok(true)
  }

  /// Merge one confirmed entity into a cached collection of `T`.
  ///
  /// An entity with a known key is replaced in place unless the cached copy
  /// is newer; an unknown entity is added at the front. Absent collections
  /// are left for the next fetch.
  pub fn upsert<T: Cacheable>(&self, key: &QueryKey, entity: &T) -> Result<bool, CacheError> {
    let entity_key = entity.cache_key();
    let mut merged = false;
    self.patch::<Vec<T>, _>(key, |items| {
      match items.iter_mut().find(|e| e.cache_key() == entity_key) {
        Some(existing) => {
          let newer_cached = match (existing.updated_at(), entity.updated_at()) {
            (Some(cached), Some(incoming)) => cached > incoming,
            _ => false,
          };
          if !newer_cached {
            *existing = entity.clone();
            merged = true;
          }
        }
        None => {
          items.insert(0, entity.clone());
          merged = true;
        }
      }
    })?;
    if merged {
      debug!(key = %key, entity = T::entity_type(), id = %entity_key, "cache upsert");
    }
    Ok(merged)
  }

  /// Drop the entry, e.g. when its last reader goes away.
  pub fn remove(&self, key: &QueryKey) -> bool {
    let (version, listeners) = {
      let mut inner = self.lock();
      let Some(entry) = inner.entries.remove(key) else {
        return false;
      };
      (entry.version, inner.listeners_for(key))
    };
    Self::notify(
      listeners,
      CacheEvent {
        key: key.clone(),
        kind: CacheEventKind::Removed,
        version,
      },
    );
    true
  }

  /// Register `listener` for changes to `key`. The entry is torn down when
  /// the last subscription for it is dropped.
  pub fn subscribe(
    &self,
    key: &QueryKey,
    listener: impl Fn(&CacheEvent) + Send + Sync + 'static,
  ) -> Subscription {
    let mut inner = self.lock();
    let id = inner.bump_id();
    inner
      .listeners
      .entry(key.clone())
      .or_default()
      .push((id, Arc::new(listener)));
    Subscription {
      cache: Arc::downgrade(&self.inner),
      key: key.clone(),
      id,
    }
  }

  pub fn has_subscribers(&self, key: &QueryKey) -> bool {
    self
      .lock()
      .listeners
      .get(key)
      .is_some_and(|ls| !ls.is_empty())
  }
}

/// Handle for a registered listener; unsubscribes on drop.
pub struct Subscription {
  cache: Weak<Mutex<CacheInner>>,
  key: QueryKey,
  id: u64,
}

impl Drop for Subscription {
  fn drop(&mut self) {
    let Some(inner) = self.cache.upgrade() else {
      return;
    };
    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
    let now_empty = match inner.listeners.get_mut(&self.key) {
      Some(listeners) => {
        listeners.retain(|(id, _)| *id != self.id);
        listeners.is_empty()
      }
      None => false,
    };
    if now_empty {
      inner.listeners.remove(&self.key);
      if inner.entries.remove(&self.key).is_some() {
        debug!(key = %self.key, "cache entry torn down");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::app;
  use crate::api::types::{Application, ApplicationStatus};
  use pretty_assertions::assert_eq;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn seeded() -> (QueryCache, QueryKey) {
    let cache = QueryCache::new();
    let key = QueryKey::applications();
    cache
      .set(
        &key,
        &vec![
          app("a", ApplicationStatus::Applied),
          app("b", ApplicationStatus::Interview),
        ],
      )
      .unwrap();
    (cache, key)
  }

  fn set_status(id: &'static str, status: ApplicationStatus) -> impl FnOnce(&mut Vec<Application>) {
    move |apps| {
      for a in apps.iter_mut().filter(|a| a.id == id) {
        a.status = status;
      }
    }
  }

  #[test]
  fn test_get_absent_returns_none() {
    let cache = QueryCache::new();
    let result: Option<Cached<Vec<Application>>> = cache.get(&QueryKey::applications()).unwrap();
    assert!(result.is_none());
  }

  #[test]
  fn test_patch_returns_previous_value() {
    let (cache, key) = seeded();
    let before = cache.get_raw(&key).unwrap();

    let previous = cache
      .patch::<Vec<Application>, _>(&key, set_status("a", ApplicationStatus::Offer))
      .unwrap();

    assert_eq!(previous, Some(before));
    let apps: Cached<Vec<Application>> = cache.get(&key).unwrap().unwrap();
    assert_eq!(apps.data[0].status, ApplicationStatus::Offer);
    assert_eq!(apps.state, EntryState::Fresh);
  }

  #[test]
  fn test_patch_absent_is_noop() {
    let cache = QueryCache::new();
    let key = QueryKey::applications();
    let previous = cache
      .patch::<Vec<Application>, _>(&key, set_status("a", ApplicationStatus::Offer))
      .unwrap();
    assert_eq!(previous, None);
    assert!(cache.get_raw(&key).is_none());
  }

  #[test]
  fn test_rollback_restores_pre_patch_value_exactly() {
    let (cache, key) = seeded();
    let before = cache.get_raw(&key).unwrap();

    let snapshot = cache.snapshot(&key);
    cache
      .patch::<Vec<Application>, _>(&key, set_status("a", ApplicationStatus::Rejected))
      .unwrap();
    assert_ne!(cache.get_raw(&key).unwrap(), before);

    assert!(cache.rollback(&key, &snapshot));
    assert_eq!(cache.get_raw(&key).unwrap(), before);
  }

  #[test]
  fn test_rollback_is_idempotent_per_token() {
    let (cache, key) = seeded();
    let snapshot = cache.snapshot(&key);
    cache
      .patch::<Vec<Application>, _>(&key, set_status("a", ApplicationStatus::Offer))
      .unwrap();
    assert!(cache.rollback(&key, &snapshot));

    // A newer write after the rollback must survive a repeated rollback
    cache
      .patch::<Vec<Application>, _>(&key, set_status("b", ApplicationStatus::Offer))
      .unwrap();
    let after_second_write = cache.get_raw(&key).unwrap();

    assert!(!cache.rollback(&key, &snapshot));
    assert_eq!(cache.get_raw(&key).unwrap(), after_second_write);
  }

  #[test]
  fn test_cloned_snapshot_shares_consumption() {
    let (cache, key) = seeded();
    let snapshot = cache.snapshot(&key);
    let copy = snapshot.clone();
    cache
      .patch::<Vec<Application>, _>(&key, set_status("a", ApplicationStatus::Offer))
      .unwrap();

    assert!(cache.rollback(&key, &copy));
    cache
      .patch::<Vec<Application>, _>(&key, set_status("b", ApplicationStatus::Rejected))
      .unwrap();
    let latest = cache.get_raw(&key).unwrap();

    assert!(!cache.rollback(&key, &snapshot));
    assert_eq!(cache.get_raw(&key).unwrap(), latest);
  }

  #[test]
  fn test_mismatched_key_does_not_consume_snapshot() {
    let (cache, key) = seeded();
    let snapshot = cache.snapshot(&key);
    cache
      .patch::<Vec<Application>, _>(&key, set_status("a", ApplicationStatus::Offer))
      .unwrap();
    assert!(!cache.rollback(&QueryKey::application("a"), &snapshot));
    assert!(cache.rollback(&key, &snapshot));
  }

  #[test]
  fn test_rollback_with_mismatched_key_is_refused() {
    let (cache, key) = seeded();
    let snapshot = cache.snapshot(&key);
    assert!(!cache.rollback(&QueryKey::application("a"), &snapshot));
  }

  #[test]
  fn test_rollback_of_absent_snapshot_removes_entry() {
    let cache = QueryCache::new();
    let key = QueryKey::ai_outputs("a");
    let snapshot = cache.snapshot(&key);
    cache.set(&key, &Vec::<serde_json::Value>::new()).unwrap();

    assert!(cache.rollback(&key, &snapshot));
    assert!(cache.get_raw(&key).is_none());
  }

  #[test]
  fn test_optimistic_write_flags_entry_until_confirmed() {
    let (cache, key) = seeded();
    let snapshot = cache.snapshot(&key);
    cache
      .patch_optimistic::<Vec<Application>, _>(&key, &snapshot, set_status("a", ApplicationStatus::Offer))
      .unwrap();
    assert_eq!(cache.state(&key), Some(EntryState::Optimistic));

    let read: Cached<Vec<Application>> = cache.get(&key).unwrap().unwrap();
    assert_eq!(read.state, EntryState::Optimistic);

    cache.confirm(&key, &snapshot);
    assert_eq!(cache.state(&key), Some(EntryState::Fresh));
  }

  #[test]
  fn test_rollback_releases_optimistic_flag() {
    let (cache, key) = seeded();
    let snapshot = cache.snapshot(&key);
    cache
      .patch_optimistic::<Vec<Application>, _>(&key, &snapshot, set_status("a", ApplicationStatus::Offer))
      .unwrap();
    cache.rollback(&key, &snapshot);
    assert_eq!(cache.state(&key), Some(EntryState::Fresh));
  }

  #[test]
  fn test_invalidate_marks_stale_and_keeps_value() {
    let (cache, key) = seeded();
    let before = cache.get_raw(&key).unwrap();
    assert!(cache.invalidate(&key));
    assert_eq!(cache.state(&key), Some(EntryState::Stale));
    assert_eq!(cache.get_raw(&key).unwrap(), before);
    assert!(!cache.invalidate(&QueryKey::application("missing")));
  }

  #[test]
  fn test_every_mutation_notifies_subscribers() {
    let (cache, key) = seeded();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = cache.subscribe(&key, move |event| sink.lock().unwrap().push(event.kind));

    let snapshot = cache.snapshot(&key);
    cache
      .patch::<Vec<Application>, _>(&key, set_status("a", ApplicationStatus::Offer))
      .unwrap();
    cache.invalidate(&key);
    cache.rollback(&key, &snapshot);
    cache.set(&key, &Vec::<Application>::new()).unwrap();

    assert_eq!(
      *seen.lock().unwrap(),
      vec![
        CacheEventKind::Patched,
        CacheEventKind::Invalidated,
        CacheEventKind::RolledBack,
        CacheEventKind::Set,
      ]
    );
  }

  #[test]
  fn test_listener_observes_new_value_synchronously() {
    let (cache, key) = seeded();
    let reader = cache.clone();
    let observed = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&observed);
    let _sub = cache.subscribe(&key, move |event| {
      let apps: Option<Cached<Vec<Application>>> = reader.get(&event.key).unwrap();
      *sink.lock().unwrap() = apps.map(|a| a.data[0].status);
    });

    cache
      .patch::<Vec<Application>, _>(&key, set_status("a", ApplicationStatus::Interview))
      .unwrap();
    assert_eq!(*observed.lock().unwrap(), Some(ApplicationStatus::Interview));
  }

  #[test]
  fn test_dropping_last_subscription_tears_down_entry() {
    let (cache, key) = seeded();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let first = cache.subscribe(&key, move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    let second = cache.subscribe(&key, |_| {});

    drop(first);
    assert!(cache.has_subscribers(&key));
    cache.invalidate(&key);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    drop(second);
    assert!(!cache.has_subscribers(&key));
    assert!(cache.get_raw(&key).is_none());
  }

  #[test]
  fn test_complete_fetch_refused_after_newer_write() {
    let (cache, key) = seeded();
    let ticket = cache.begin_fetch(&key);
    cache
      .patch::<Vec<Application>, _>(&key, set_status("a", ApplicationStatus::Offer))
      .unwrap();
    let after_patch = cache.get_raw(&key).unwrap();

    let applied = cache
      .complete_fetch(ticket, &vec![app("a", ApplicationStatus::Applied)])
      .unwrap();

    assert!(!applied);
    assert_eq!(cache.get_raw(&key).unwrap(), after_patch);
  }

  #[test]
  fn test_complete_fetch_refused_while_optimistic_write_pending() {
    let (cache, key) = seeded();
    let snapshot = cache.snapshot(&key);
    cache
      .patch_optimistic::<Vec<Application>, _>(&key, &snapshot, set_status("a", ApplicationStatus::Offer))
      .unwrap();
    let ticket = cache.begin_fetch(&key);

    let applied = cache
      .complete_fetch(ticket, &vec![app("a", ApplicationStatus::Applied)])
      .unwrap();
    assert!(!applied);
  }

  #[test]
  fn test_complete_fetch_clears_stale() {
    let (cache, key) = seeded();
    cache.invalidate(&key);
    let ticket = cache.begin_fetch(&key);
    let applied = cache
      .complete_fetch(ticket, &vec![app("a", ApplicationStatus::Offer)])
      .unwrap();
    assert!(applied);
    assert_eq!(cache.state(&key), Some(EntryState::Fresh));
  }

  #[test]
  fn test_complete_fetch_into_absent_entry() {
    let cache = QueryCache::new();
    let key = QueryKey::applications();
    let ticket = cache.begin_fetch(&key);
    assert!(cache
      .complete_fetch(ticket, &vec![app("a", ApplicationStatus::Applied)])
      .unwrap());
  }

  #[test]
  fn test_upsert_replaces_and_inserts() {
    let (cache, key) = seeded();
    let mut changed = app("b", ApplicationStatus::Offer);
    changed.updated_at = "2024-06-01T00:00:00".into();
    assert!(cache.upsert(&key, &changed).unwrap());
    assert!(cache.upsert(&key, &app("c", ApplicationStatus::NotApplied)).unwrap());

    let apps: Cached<Vec<Application>> = cache.get(&key).unwrap().unwrap();
    let ids: Vec<_> = apps.data.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
    assert_eq!(apps.data[2].status, ApplicationStatus::Offer);
  }

  #[test]
  fn test_upsert_keeps_newer_cached_copy() {
    let (cache, key) = seeded();
    let mut older = app("a", ApplicationStatus::Rejected);
    older.updated_at = "2023-01-01T00:00:00".into();
    assert!(!cache.upsert(&key, &older).unwrap());

    let apps: Cached<Vec<Application>> = cache.get(&key).unwrap().unwrap();
    assert_eq!(apps.data[0].status, ApplicationStatus::Applied);
  }

  #[test]
  fn test_remove_notifies_and_drops_entry() {
    let (cache, key) = seeded();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = cache.subscribe(&key, move |event| sink.lock().unwrap().push(event.kind));

    assert!(cache.remove(&key));
    assert!(!cache.remove(&key));
    assert!(cache.get_raw(&key).is_none());
    assert_eq!(*seen.lock().unwrap(), vec![CacheEventKind::Removed]);
  }

  #[test]
  fn test_get_with_wrong_type_is_an_error() {
    let (cache, key) = seeded();
    let result = cache.get::<Vec<u32>>(&key);
    assert!(matches!(result, Err(CacheError::Decode { .. })));
  }
}
