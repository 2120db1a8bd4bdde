//! Scripted in-memory backend for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::api_types::{
  ApplicationFilter, ApplicationPatch, NewApplication, NewReminder, ProfileUpdate, ReminderPatch,
  RemoteTaskStatus, TaskHandle, TaskStatusResponse,
};
use super::error::StoreError;
use super::remote::{RemoteStore, StoreResult};
use super::types::{
  AiKind, AiOutput, Application, ApplicationStatus, Priority, Profile, Reminder,
};

/// A request observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
  ListApplications,
  GetApplication(String),
  CreateApplication(String),
  UpdateApplication(String, ApplicationPatch),
  ListAiOutputs(String),
  SubmitTask(AiKind, String),
  TaskStatus(String),
  ListReminders(Option<bool>),
  CreateReminder(String),
  UpdateReminder(String),
  GetProfile,
  UpdateProfile(ProfileUpdate),
}

/// Outcome of one scripted update call, optionally held until released
struct UpdateScript {
  result: Result<(), StoreError>,
  gate: Option<oneshot::Receiver<()>>,
}

type PollHook = Box<dyn Fn(usize) + Send + Sync>;

#[derive(Default)]
pub struct MockStore {
  applications: Mutex<Vec<Application>>,
  ai_outputs: Mutex<Vec<AiOutput>>,
  reminders: Mutex<Vec<Reminder>>,
  profile: Mutex<Option<Profile>>,
  updates: Mutex<VecDeque<UpdateScript>>,
  list_failure: Mutex<Option<StoreError>>,
  submit_failure: Mutex<Option<StoreError>>,
  statuses: Mutex<VecDeque<RemoteTaskStatus>>,
  poll_hook: Mutex<Option<PollHook>>,
  calls: Mutex<Vec<Call>>,
}

pub fn app(id: &str, status: ApplicationStatus) -> Application {
  Application {
    id: id.to_string(),
    user_id: "user-1".into(),
    job_posting_id: format!("posting-{}", id),
    status,
    priority: Priority::Medium,
    notes: String::new(),
    applied_at: None,
    next_followup_at: None,
    salary_expectation: None,
    created_at: "2024-05-01T10:00:00".into(),
    updated_at: "2024-05-01T10:00:00".into(),
    job_posting: None,
  }
}

impl MockStore {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn with_applications(apps: Vec<Application>) -> Arc<Self> {
    let store = Self::default();
    *store.applications.lock().unwrap() = apps;
    Arc::new(store)
  }

  /// Script the next update call to fail
  pub fn fail_next_update(&self, error: StoreError) {
    self.updates.lock().unwrap().push_back(UpdateScript {
      result: Err(error),
      gate: None,
    });
  }

  /// Script the next update call to wait for the returned sender before
  /// answering with `result`
  pub fn hold_next_update(&self, result: Result<(), StoreError>) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    self.updates.lock().unwrap().push_back(UpdateScript {
      result,
      gate: Some(rx),
    });
    tx
  }

  pub fn fail_list(&self, error: StoreError) {
    *self.list_failure.lock().unwrap() = Some(error);
  }

  pub fn fail_submit(&self, error: StoreError) {
    *self.submit_failure.lock().unwrap() = Some(error);
  }

  /// Statuses returned by successive polls; once exhausted every poll
  /// answers `Pending`
  pub fn script_statuses(&self, statuses: &[RemoteTaskStatus]) {
    self.statuses.lock().unwrap().extend(statuses.iter().copied());
  }

  /// Called with the 1-based poll number before each poll answers
  pub fn on_poll(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
    *self.poll_hook.lock().unwrap() = Some(Box::new(hook));
  }

  pub fn add_output(&self, output: AiOutput) {
    self.ai_outputs.lock().unwrap().insert(0, output);
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn updates(&self) -> Vec<(String, ApplicationPatch)> {
    self
      .calls()
      .into_iter()
      .filter_map(|call| match call {
        Call::UpdateApplication(id, patch) => Some((id, patch)),
        _ => None,
      })
      .collect()
  }

  pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
    self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
  }

  pub fn server_application(&self, id: &str) -> Option<Application> {
    self
      .applications
      .lock()
      .unwrap()
      .iter()
      .find(|a| a.id == id)
      .cloned()
  }

  fn record(&self, call: Call) -> usize {
    let mut calls = self.calls.lock().unwrap();
    calls.push(call);
    calls.len()
  }
}

fn not_found(what: &str) -> StoreError {
  StoreError::http(404, format!("{} not found", what))
}

#[async_trait]
impl RemoteStore for MockStore {
  async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<Application>> {
    self.record(Call::ListApplications);
    if let Some(err) = self.list_failure.lock().unwrap().clone() {
      return Err(err);
    }
    Ok(
      self
        .applications
        .lock()
        .unwrap()
        .iter()
        .filter(|a| filter.status.map_or(true, |s| a.status == s))
        .cloned()
        .collect(),
    )
  }

  async fn get_application(&self, id: &str) -> StoreResult<Application> {
    self.record(Call::GetApplication(id.to_string()));
    self
      .server_application(id)
      .ok_or_else(|| not_found("Application"))
  }

  async fn create_application(&self, body: &NewApplication) -> StoreResult<Application> {
    let n = self.record(Call::CreateApplication(body.role_title.clone()));
    let mut created = app(&format!("new-{}", n), body.status);
    created.priority = body.priority;
    created.notes = body.notes.clone();
    self.applications.lock().unwrap().insert(0, created.clone());
    Ok(created)
  }

  async fn update_application(
    &self,
    id: &str,
    patch: &ApplicationPatch,
  ) -> StoreResult<Application> {
    self.record(Call::UpdateApplication(id.to_string(), patch.clone()));
    let script = self.updates.lock().unwrap().pop_front();
    let result = match script {
      Some(UpdateScript { result, gate }) => {
        if let Some(gate) = gate {
          let _ = gate.await;
        }
        result
      }
      None => Ok(()),
    };
    result?;

    let mut apps = self.applications.lock().unwrap();
    let app = apps
      .iter_mut()
      .find(|a| a.id == id)
      .ok_or_else(|| not_found("Application"))?;
    if let Some(status) = patch.status {
      app.status = status;
    }
    if let Some(priority) = patch.priority {
      app.priority = priority;
    }
    if let Some(notes) = &patch.notes {
      app.notes = notes.clone();
    }
    app.updated_at = "2024-05-02T09:00:00".into();
    Ok(app.clone())
  }

  async fn list_ai_outputs(&self, application_id: &str) -> StoreResult<Vec<AiOutput>> {
    self.record(Call::ListAiOutputs(application_id.to_string()));
    Ok(self.ai_outputs.lock().unwrap().clone())
  }

  async fn submit_ai_task(&self, kind: AiKind, application_id: &str) -> StoreResult<TaskHandle> {
    let n = self.record(Call::SubmitTask(kind, application_id.to_string()));
    if let Some(err) = self.submit_failure.lock().unwrap().clone() {
      return Err(err);
    }
    Ok(TaskHandle {
      task_id: format!("task-{}", n),
      status: "submitted".into(),
    })
  }

  async fn get_task_status(&self, task_id: &str) -> StoreResult<TaskStatusResponse> {
    self.record(Call::TaskStatus(task_id.to_string()));
    let polls = self.count(|c| matches!(c, Call::TaskStatus(_)));
    if let Some(hook) = self.poll_hook.lock().unwrap().as_ref() {
      hook(polls);
    }
    let status = self
      .statuses
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or(RemoteTaskStatus::Pending);
    let result = match status {
      RemoteTaskStatus::Success => Some(serde_json::json!({ "output_id": "out-1" })),
      RemoteTaskStatus::Failure => Some(serde_json::json!({ "error": "model unavailable" })),
      _ => None,
    };
    Ok(TaskStatusResponse {
      task_id: task_id.to_string(),
      status,
      result,
    })
  }

  async fn list_reminders(&self, done: Option<bool>) -> StoreResult<Vec<Reminder>> {
    self.record(Call::ListReminders(done));
    Ok(
      self
        .reminders
        .lock()
        .unwrap()
        .iter()
        .filter(|r| done.map_or(true, |d| r.done == d))
        .cloned()
        .collect(),
    )
  }

  async fn create_reminder(
    &self,
    application_id: &str,
    body: &NewReminder,
  ) -> StoreResult<Reminder> {
    let n = self.record(Call::CreateReminder(application_id.to_string()));
    let reminder = Reminder {
      id: format!("rem-{}", n),
      application_id: application_id.to_string(),
      user_id: "user-1".into(),
      text: body.text.clone(),
      due_at: body.due_at.clone(),
      done: false,
      created_at: String::new(),
    };
    self.reminders.lock().unwrap().push(reminder.clone());
    Ok(reminder)
  }

  async fn update_reminder(&self, id: &str, patch: &ReminderPatch) -> StoreResult<Reminder> {
    self.record(Call::UpdateReminder(id.to_string()));
    let mut reminders = self.reminders.lock().unwrap();
    let reminder = reminders
      .iter_mut()
      .find(|r| r.id == id)
      .ok_or_else(|| not_found("Reminder"))?;
    if let Some(done) = patch.done {
      reminder.done = done;
    }
    if let Some(text) = &patch.text {
      reminder.text = text.clone();
    }
    if let Some(due_at) = &patch.due_at {
      reminder.due_at = due_at.clone();
    }
    Ok(reminder.clone())
  }

  async fn get_profile(&self) -> StoreResult<Profile> {
    self.record(Call::GetProfile);
    self
      .profile
      .lock()
      .unwrap()
      .clone()
      .ok_or_else(|| not_found("Profile"))
  }

  async fn update_profile(&self, update: &ProfileUpdate) -> StoreResult<Profile> {
    self.record(Call::UpdateProfile(update.clone()));
    let mut stored = self.profile.lock().unwrap();
    let profile = stored.get_or_insert_with(|| Profile {
      id: "profile-1".into(),
      user_id: "user-1".into(),
      headline: None,
      summary: None,
      location: None,
      links_json: None,
      skills_json: None,
      projects_json: None,
      experience_json: None,
    });
    let update = update.clone();
    if update.headline.is_some() {
      profile.headline = update.headline;
    }
    if update.summary.is_some() {
      profile.summary = update.summary;
    }
    if update.location.is_some() {
      profile.location = update.location;
    }
    if update.links_json.is_some() {
      profile.links_json = update.links_json;
    }
    if update.skills_json.is_some() {
      profile.skills_json = update.skills_json;
    }
    if update.projects_json.is_some() {
      profile.projects_json = update.projects_json;
    }
    if update.experience_json.is_some() {
      profile.experience_json = update.experience_json;
    }
    Ok(profile.clone())
  }
}
