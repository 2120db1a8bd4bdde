//! Per-application view of AI actions and their generated outputs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::types::{AiKind, AiOutput};
use crate::api::RemoteStore;
use crate::cache::{CacheLayer, CacheResult, FetchError, QueryKey, Subscription};

use super::orchestrator::{TaskOrchestrator, TaskOutcome};
use super::state::TaskState;

type Finished = Arc<Mutex<HashMap<AiKind, TaskState>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// AI actions for one application.
///
/// Holds a subscription on the application's outputs so finished tasks
/// invalidate them. Dropping the panel cancels the tasks it started.
pub struct AiTaskPanel {
  orchestrator: TaskOrchestrator,
  store: Arc<dyn RemoteStore>,
  layer: CacheLayer,
  application_id: String,
  key: QueryKey,
  started: Mutex<HashSet<AiKind>>,
  finished: Finished,
  revision: Arc<AtomicU64>,
  _subscription: Subscription,
}

impl AiTaskPanel {
  pub fn new(
    orchestrator: TaskOrchestrator,
    store: Arc<dyn RemoteStore>,
    layer: CacheLayer,
    application_id: &str,
  ) -> Self {
    let key = QueryKey::ai_outputs(application_id);
    let revision = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&revision);
    let subscription = layer.cache().subscribe(&key, move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    Self {
      orchestrator,
      store,
      layer,
      application_id: application_id.to_string(),
      key,
      started: Mutex::default(),
      finished: Arc::default(),
      revision,
      _subscription: subscription,
    }
  }

  /// Bumped on every change to the cached outputs
  #[allow(dead_code)]
  pub fn revision(&self) -> u64 {
    self.revision.load(Ordering::SeqCst)
  }

  /// Start `kind` in the background. A run already in flight for this
  /// application is joined rather than submitted again.
  pub fn run(&self, kind: AiKind) -> JoinHandle<TaskOutcome> {
    lock(&self.started).insert(kind);
    lock(&self.finished).remove(&kind);
    let orchestrator = self.orchestrator.clone();
    let finished = Arc::clone(&self.finished);
    let application_id = self.application_id.clone();
    tokio::spawn(async move {
      let outcome = orchestrator.run_task(kind, &application_id).await;
      lock(&finished).insert(kind, outcome.state.clone());
      outcome
    })
  }

  /// Run several actions at once and wait for all of them.
  pub async fn run_all(&self, kinds: &[AiKind]) -> Vec<TaskOutcome> {
    let handles: Vec<_> = kinds.iter().map(|kind| self.run(*kind)).collect();
    join_all(handles)
      .await
      .into_iter()
      .zip(kinds)
      .map(|(joined, kind)| match joined {
        Ok(outcome) => outcome,
        Err(err) => {
          debug!(kind = %kind, error = %err, "task runner stopped");
          TaskOutcome {
            state: TaskState::Cancelled { task_id: None },
            coalesced: false,
          }
        }
      })
      .collect()
  }

  /// In-flight state of `kind`, or how its last run ended.
  pub fn status(&self, kind: AiKind) -> Option<TaskState> {
    self
      .orchestrator
      .status(kind, &self.application_id)
      .or_else(|| lock(&self.finished).get(&kind).cloned())
  }

  pub fn cancel(&self, kind: AiKind) -> bool {
    self.orchestrator.cancel(kind, &self.application_id)
  }

  /// Generated outputs, newest first; refetched only when stale.
  pub async fn outputs(&self) -> Result<CacheResult<Vec<AiOutput>>, FetchError> {
    let store = Arc::clone(&self.store);
    let id = self.application_id.clone();
    self
      .layer
      .fetch(&self.key, || async move { store.list_ai_outputs(&id).await })
      .await
  }

  #[allow(dead_code)]
  pub async fn refresh_outputs(&self) -> Result<CacheResult<Vec<AiOutput>>, FetchError> {
    let store = Arc::clone(&self.store);
    let id = self.application_id.clone();
    self
      .layer
      .refetch(&self.key, || async move { store.list_ai_outputs(&id).await })
      .await
  }

  /// Most recent output of `kind`
  pub async fn latest(&self, kind: AiKind) -> Result<Option<AiOutput>, FetchError> {
    let outputs = self.outputs().await?;
    Ok(outputs.data.into_iter().find(|o| o.kind == kind))
  }
}

impl Drop for AiTaskPanel {
  fn drop(&mut self) {
    for kind in lock(&self.started).drain() {
      if self.orchestrator.cancel(kind, &self.application_id) {
        debug!(application = %self.application_id, kind = %kind, "cancelled on close");
      }
    }
  }
}
