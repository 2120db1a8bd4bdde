//! Request payloads and task endpoint responses.
//!
//! Entity types shared with the cache live in `types`; these types exist only
//! on the wire.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use super::types::{ApplicationStatus, ExperienceItem, Priority, ProjectItem};

// ============================================================================
// Application writes
// ============================================================================

/// Partial update for `PATCH /applications/{id}`. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplicationPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<ApplicationStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub next_followup_at: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub salary_expectation: Option<i64>,
}

impl ApplicationPatch {
  pub fn status(status: ApplicationStatus) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }

  pub fn notes(notes: impl Into<String>) -> Self {
    Self {
      notes: Some(notes.into()),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

/// Flat creation payload; the backend finds or creates the company and
/// creates the job posting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewApplication {
  pub company_name: String,
  pub role_title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job_description: Option<String>,
  pub status: ApplicationStatus,
  pub priority: Priority,
  pub notes: String,
}

impl NewApplication {
  pub fn new(company_name: impl Into<String>, role_title: impl Into<String>) -> Self {
    Self {
      company_name: company_name.into(),
      role_title: role_title.into(),
      job_url: None,
      job_description: None,
      status: ApplicationStatus::NotApplied,
      priority: Priority::Medium,
      notes: String::new(),
    }
  }
}

/// Query parameters for `GET /applications`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ApplicationFilter {
  pub status: Option<ApplicationStatus>,
  pub search: Option<String>,
}

impl ApplicationFilter {
  pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(status) = self.status {
      pairs.push(("status", status.as_str().to_string()));
    }
    if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
      pairs.push(("search", search.trim().to_string()));
    }
    pairs
  }
}

// ============================================================================
// Reminder writes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReminder {
  pub text: String,
  pub due_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReminderPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub done: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_at: Option<String>,
}

// ============================================================================
// Profile
// ============================================================================

/// Body of `PUT /profile`. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub headline: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub summary: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub links_json: Option<BTreeMap<String, String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub skills_json: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub projects_json: Option<Vec<ProjectItem>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub experience_json: Option<Vec<ExperienceItem>>,
}

impl ProfileUpdate {
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

// ============================================================================
// AI task endpoints
// ============================================================================

/// Response of `POST /ai/{kind}/{application_id}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskHandle {
  pub task_id: String,
  #[serde(default)]
  pub status: String,
}

/// Worker-side status of a submitted job.
///
/// The worker reports queue states verbatim; anything that is neither queued
/// nor finished counts as running so polling continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RemoteTaskStatus {
  Pending,
  Running,
  Success,
  Failure,
}

impl From<String> for RemoteTaskStatus {
  fn from(s: String) -> Self {
    match s.to_uppercase().as_str() {
      "PENDING" => Self::Pending,
      "SUCCESS" => Self::Success,
      "FAILURE" | "REVOKED" => Self::Failure,
      _ => Self::Running,
    }
  }
}

/// Response of `GET /ai/tasks/{task_id}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskStatusResponse {
  #[serde(default)]
  pub task_id: String,
  pub status: RemoteTaskStatus,
  pub result: Option<serde_json::Value>,
}

impl TaskStatusResponse {
  /// Error message carried by a failed task result, if any
  pub fn error_message(&self) -> Option<String> {
    let result = self.result.as_ref()?;
    result
      .get("error")
      .and_then(|v| v.as_str())
      .map(String::from)
  }
}

/// Error body returned by the backend (`{"detail": ...}`)
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub detail: serde_json::Value,
}

impl ApiErrorBody {
  /// Flatten `detail`, which is either a string or a list of validation errors
  pub fn message(&self) -> String {
    match &self.detail {
      serde_json::Value::String(s) => s.clone(),
      serde_json::Value::Array(items) => items
        .iter()
        .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
        .collect::<Vec<_>>()
        .join("; "),
      other => other.to_string(),
    }
  }
}
