//! Drives AI tasks through submit, poll and resolve.
//!
//! At most one task runs per (application, kind). A second request for the
//! same pair observes the running task instead of submitting again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::api_types::TaskStatusResponse;
use crate::api::types::AiKind;
use crate::api::{RemoteStore, StoreResult};
use crate::cache::{QueryCache, QueryKey};

use super::state::{transition, PollPolicy, TaskEvent, TaskState};

/// Identity of a running task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
  pub application_id: String,
  pub kind: AiKind,
}

impl TaskKey {
  pub fn new(kind: AiKind, application_id: &str) -> Self {
    Self {
      application_id: application_id.to_string(),
      kind,
    }
  }
}

/// How a `run_task` call ended
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
  pub state: TaskState,
  /// The call joined a task that was already running
  pub coalesced: bool,
}

struct InFlight {
  state: watch::Receiver<TaskState>,
  cancel: watch::Sender<bool>,
}

type Registry = Arc<Mutex<HashMap<TaskKey, InFlight>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<TaskKey, InFlight>> {
  registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the registry entry when the owning run ends or is dropped.
struct InFlightGuard {
  registry: Registry,
  key: TaskKey,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    lock(&self.registry).remove(&self.key);
  }
}

enum Role {
  Owner {
    state: watch::Sender<TaskState>,
    cancel: watch::Receiver<bool>,
  },
  Joiner(watch::Receiver<TaskState>),
}

#[derive(Clone)]
pub struct TaskOrchestrator {
  store: Arc<dyn RemoteStore>,
  cache: QueryCache,
  policy: PollPolicy,
  in_flight: Registry,
}

impl TaskOrchestrator {
  pub fn new(store: Arc<dyn RemoteStore>, cache: QueryCache, policy: PollPolicy) -> Self {
    Self {
      store,
      cache,
      policy,
      in_flight: Arc::default(),
    }
  }

  /// Run one task to a terminal state.
  pub async fn run_task(&self, kind: AiKind, application_id: &str) -> TaskOutcome {
    let key = TaskKey::new(kind, application_id);

    let role = {
      let mut registry = lock(&self.in_flight);
      if let Some(existing) = registry.get(&key) {
        Role::Joiner(existing.state.clone())
      } else {
        let (state_tx, state_rx) = watch::channel(TaskState::Submitting);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        registry.insert(
          key.clone(),
          InFlight {
            state: state_rx,
            cancel: cancel_tx,
          },
        );
        Role::Owner {
          state: state_tx,
          cancel: cancel_rx,
        }
      }
    };

    match role {
      Role::Joiner(state) => {
        info!(application = application_id, kind = %kind, "task already running, observing it");
        TaskOutcome {
          state: wait_terminal(state).await,
          coalesced: true,
        }
      }
      Role::Owner { state, cancel } => {
        let _guard = InFlightGuard {
          registry: Arc::clone(&self.in_flight),
          key: key.clone(),
        };
        TaskOutcome {
          state: self.drive(&key, state, cancel).await,
          coalesced: false,
        }
      }
    }
  }

  /// Run a task in the background
  #[allow(dead_code)]
  pub fn spawn_task(&self, kind: AiKind, application_id: &str) -> JoinHandle<TaskOutcome> {
    let this = self.clone();
    let application_id = application_id.to_string();
    tokio::spawn(async move { this.run_task(kind, &application_id).await })
  }

  /// Request cancellation of a running task. Returns whether one was running.
  pub fn cancel(&self, kind: AiKind, application_id: &str) -> bool {
    let registry = lock(&self.in_flight);
    match registry.get(&TaskKey::new(kind, application_id)) {
      Some(task) => {
        task.cancel.send_replace(true);
        true
      }
      None => false,
    }
  }

  /// Current state of a running task
  pub fn status(&self, kind: AiKind, application_id: &str) -> Option<TaskState> {
    let registry = lock(&self.in_flight);
    registry
      .get(&TaskKey::new(kind, application_id))
      .map(|task| task.state.borrow().clone())
  }

  #[allow(dead_code)]
  pub fn running(&self) -> usize {
    lock(&self.in_flight).len()
  }

  async fn drive(
    &self,
    key: &TaskKey,
    publish: watch::Sender<TaskState>,
    mut cancel: watch::Receiver<bool>,
  ) -> TaskState {
    let step = |state: TaskState, event: TaskEvent| {
      let next = transition(state, event, &self.policy);
      debug!(application = %key.application_id, kind = %key.kind, state = %next, "task state");
      publish.send_replace(next.clone());
      next
    };

    let submitted = tokio::select! {
      biased;
      _ = cancelled(&mut cancel) => None,
      result = self.store.submit_ai_task(key.kind, &key.application_id) => Some(result),
    };
    let event = match submitted {
      None => TaskEvent::Cancel,
      Some(Ok(handle)) => {
        info!(application = %key.application_id, kind = %key.kind, task = %handle.task_id, "task submitted");
        TaskEvent::Accepted {
          task_id: handle.task_id,
        }
      }
      Some(Err(err)) => TaskEvent::SubmitFailed {
        reason: err.to_string(),
      },
    };
    let mut state = step(TaskState::Submitting, event);

    while let TaskState::Polling { task_id, .. } = &state {
      let task_id = task_id.clone();
      let event = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => TaskEvent::Cancel,
        polled = self.poll_after_delay(&task_id) => {
          if *cancel.borrow() {
            TaskEvent::Cancel
          } else {
            match polled {
              Ok(response) => TaskEvent::Polled(response),
              Err(err) => TaskEvent::PollFailed {
                reason: err.to_string(),
              },
            }
          }
        }
      };
      state = step(state, event);
    }

    self.resolve(key, &state);
    state
  }

  async fn poll_after_delay(&self, task_id: &str) -> StoreResult<TaskStatusResponse> {
    tokio::time::sleep(self.policy.interval).await;
    self.store.get_task_status(task_id).await
  }

  fn resolve(&self, key: &TaskKey, state: &TaskState) {
    match state {
      TaskState::Success { task_id, .. } => {
        info!(application = %key.application_id, kind = %key.kind, task = %task_id, "task succeeded");
        let outputs = QueryKey::ai_outputs(&key.application_id);
        if self.cache.has_subscribers(&outputs) {
          self.cache.invalidate(&outputs);
        } else {
          debug!(key = %outputs, "no readers, skipping invalidation");
        }
      }
      TaskState::Failure { reason, .. } => {
        warn!(application = %key.application_id, kind = %key.kind, reason = %reason, "task failed");
      }
      TaskState::Timeout { polls, .. } => {
        warn!(application = %key.application_id, kind = %key.kind, polls, "task timed out");
      }
      TaskState::Cancelled { .. } => {
        info!(application = %key.application_id, kind = %key.kind, "task cancelled");
      }
      TaskState::Submitting | TaskState::Polling { .. } => {}
    }
  }
}

/// Resolves once cancellation has been requested.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
  loop {
    if *cancel.borrow_and_update() {
      return;
    }
    if cancel.changed().await.is_err() {
      // Sender gone without cancelling; never resolve
      std::future::pending::<()>().await;
    }
  }
}

/// Wait for a task owned by another caller to settle. A task whose owner
/// went away before settling counts as cancelled.
async fn wait_terminal(mut state: watch::Receiver<TaskState>) -> TaskState {
  loop {
    let current = state.borrow_and_update().clone();
    if current.is_terminal() {
      return current;
    }
    if state.changed().await.is_err() {
      let last = state.borrow().clone();
      if last.is_terminal() {
        return last;
      }
      return TaskState::Cancelled {
        task_id: last.task_id().map(String::from),
      };
    }
  }
}
