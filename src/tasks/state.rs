//! Lifecycle of one AI task as a pure state machine.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::api::api_types::{RemoteTaskStatus, TaskStatusResponse};
use crate::config::PollingConfig;

/// Where a task is in its submit/poll/resolve lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
  /// Submission request in flight
  Submitting,
  /// Accepted by the backend; `polls` answered so far
  Polling { task_id: String, polls: u32 },
  Success {
    task_id: String,
    result: Option<Value>,
  },
  /// Rejected at submission (`task_id` is `None`) or failed on the worker
  Failure {
    task_id: Option<String>,
    reason: String,
  },
  /// Still unfinished after the poll budget ran out
  Timeout { task_id: String, polls: u32 },
  Cancelled { task_id: Option<String> },
}

impl TaskState {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, Self::Submitting | Self::Polling { .. })
  }

  pub fn task_id(&self) -> Option<&str> {
    match self {
      Self::Submitting => None,
      Self::Polling { task_id, .. }
      | Self::Success { task_id, .. }
      | Self::Timeout { task_id, .. } => Some(task_id),
      Self::Failure { task_id, .. } | Self::Cancelled { task_id } => task_id.as_deref(),
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Submitting => "SUBMITTED",
      Self::Polling { .. } => "POLLING",
      Self::Success { .. } => "SUCCESS",
      Self::Failure { .. } => "FAILURE",
      Self::Timeout { .. } => "TIMEOUT",
      Self::Cancelled { .. } => "CANCELLED",
    }
  }
}

impl fmt::Display for TaskState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Polling { polls, .. } => write!(f, "POLLING ({} polls)", polls),
      Self::Failure { reason, .. } => write!(f, "FAILURE: {}", reason),
      Self::Timeout { polls, .. } => write!(f, "TIMEOUT after {} polls", polls),
      other => f.write_str(other.label()),
    }
  }
}

/// Input to `transition`
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
  Accepted { task_id: String },
  SubmitFailed { reason: String },
  Polled(TaskStatusResponse),
  /// The poll request itself failed
  PollFailed { reason: String },
  Cancel,
}

/// Poll cadence and budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
  pub interval: Duration,
  pub max_polls: u32,
}

impl Default for PollPolicy {
  fn default() -> Self {
    PollingConfig::default().into()
  }
}

impl From<PollingConfig> for PollPolicy {
  fn from(config: PollingConfig) -> Self {
    Self {
      interval: config.interval(),
      max_polls: config.max_polls.max(1),
    }
  }
}

/// Next state after `event`. Terminal states absorb every event; events
/// that make no sense in the current state leave it unchanged.
pub fn transition(state: TaskState, event: TaskEvent, policy: &PollPolicy) -> TaskState {
  if state.is_terminal() {
    return state;
  }

  match (state, event) {
    (state, TaskEvent::Cancel) => TaskState::Cancelled {
      task_id: state.task_id().map(String::from),
    },
    (TaskState::Submitting, TaskEvent::Accepted { task_id }) => {
      TaskState::Polling { task_id, polls: 0 }
    }
    (TaskState::Submitting, TaskEvent::SubmitFailed { reason }) => TaskState::Failure {
      task_id: None,
      reason,
    },
    (TaskState::Polling { task_id, polls }, TaskEvent::Polled(response)) => {
      let polls = polls + 1;
      match response.status {
        RemoteTaskStatus::Success => TaskState::Success {
          task_id,
          result: response.result,
        },
        RemoteTaskStatus::Failure => TaskState::Failure {
          reason: response
            .error_message()
            .unwrap_or_else(|| "task failed".to_string()),
          task_id: Some(task_id),
        },
        RemoteTaskStatus::Pending | RemoteTaskStatus::Running if polls >= policy.max_polls => {
          TaskState::Timeout { task_id, polls }
        }
        RemoteTaskStatus::Pending | RemoteTaskStatus::Running => {
          TaskState::Polling { task_id, polls }
        }
      }
    }
    (TaskState::Polling { task_id, .. }, TaskEvent::PollFailed { reason }) => TaskState::Failure {
      task_id: Some(task_id),
      reason,
    },
    (state, _) => state,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  fn polled(status: RemoteTaskStatus) -> TaskEvent {
    TaskEvent::Polled(TaskStatusResponse {
      task_id: "t1".into(),
      status,
      result: None,
    })
  }

  fn polling(polls: u32) -> TaskState {
    TaskState::Polling {
      task_id: "t1".into(),
      polls,
    }
  }

  #[test]
  fn test_submit_accepted_starts_polling() {
    let next = transition(
      TaskState::Submitting,
      TaskEvent::Accepted {
        task_id: "t1".into(),
      },
      &PollPolicy::default(),
    );
    assert_eq!(next, polling(0));
  }

  #[test]
  fn test_submit_failure_skips_polling() {
    let next = transition(
      TaskState::Submitting,
      TaskEvent::SubmitFailed {
        reason: "Application not found".into(),
      },
      &PollPolicy::default(),
    );
    assert_eq!(
      next,
      TaskState::Failure {
        task_id: None,
        reason: "Application not found".into(),
      }
    );
  }

  #[test]
  fn test_unfinished_poll_counts_up() {
    let policy = PollPolicy::default();
    let next = transition(polling(0), polled(RemoteTaskStatus::Pending), &policy);
    let next = transition(next, polled(RemoteTaskStatus::Running), &policy);
    assert_eq!(next, polling(2));
  }

  #[test]
  fn test_last_unfinished_poll_times_out() {
    let policy = PollPolicy {
      interval: Duration::from_millis(1500),
      max_polls: 30,
    };
    let next = transition(polling(29), polled(RemoteTaskStatus::Running), &policy);
    assert_eq!(
      next,
      TaskState::Timeout {
        task_id: "t1".into(),
        polls: 30,
      }
    );
  }

  #[test]
  fn test_success_on_last_poll_wins_over_timeout() {
    let policy = PollPolicy::default();
    let next = transition(polling(29), polled(RemoteTaskStatus::Success), &policy);
    assert!(matches!(next, TaskState::Success { .. }));
  }

  #[test]
  fn test_worker_failure_carries_reason() {
    let event = TaskEvent::Polled(TaskStatusResponse {
      task_id: "t1".into(),
      status: RemoteTaskStatus::Failure,
      result: Some(json!({ "error": "rate limited" })),
    });
    let next = transition(polling(3), event, &PollPolicy::default());
    assert_eq!(
      next,
      TaskState::Failure {
        task_id: Some("t1".into()),
        reason: "rate limited".into(),
      }
    );
  }

  #[test]
  fn test_poll_transport_error_is_failure() {
    let next = transition(
      polling(1),
      TaskEvent::PollFailed {
        reason: "connection reset".into(),
      },
      &PollPolicy::default(),
    );
    assert!(matches!(next, TaskState::Failure { task_id: Some(_), .. }));
  }

  #[test]
  fn test_cancel_keeps_task_id() {
    let next = transition(polling(4), TaskEvent::Cancel, &PollPolicy::default());
    assert_eq!(
      next,
      TaskState::Cancelled {
        task_id: Some("t1".into()),
      }
    );
  }

  #[test]
  fn test_terminal_states_absorb_events() {
    let policy = PollPolicy::default();
    let done = TaskState::Timeout {
      task_id: "t1".into(),
      polls: 30,
    };
    assert_eq!(transition(done.clone(), polled(RemoteTaskStatus::Success), &policy), done);
    assert_eq!(transition(done.clone(), TaskEvent::Cancel, &policy), done);
  }

  #[test]
  fn test_out_of_order_event_is_ignored() {
    let next = transition(
      TaskState::Submitting,
      polled(RemoteTaskStatus::Success),
      &PollPolicy::default(),
    );
    assert_eq!(next, TaskState::Submitting);
  }
}
