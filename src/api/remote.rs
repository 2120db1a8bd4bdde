//! The backend contract the core depends on.

use async_trait::async_trait;

use super::api_types::{
  ApplicationFilter, ApplicationPatch, NewApplication, NewReminder, ProfileUpdate, ReminderPatch,
  TaskHandle, TaskStatusResponse,
};
use super::error::StoreError;
use super::types::{AiKind, AiOutput, Application, Profile, Reminder};

pub type StoreResult<T> = Result<T, StoreError>;

/// Typed request surface of the application backend.
///
/// `HttpStore` talks to the real service; tests substitute a scripted store.
/// Authentication is handled by the implementation and never surfaces here
/// except as `StoreError::Unauthorized`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<Application>>;

  async fn get_application(&self, id: &str) -> StoreResult<Application>;

  async fn create_application(&self, body: &NewApplication) -> StoreResult<Application>;

  async fn update_application(&self, id: &str, patch: &ApplicationPatch)
    -> StoreResult<Application>;

  /// Newest first
  async fn list_ai_outputs(&self, application_id: &str) -> StoreResult<Vec<AiOutput>>;

  async fn submit_ai_task(&self, kind: AiKind, application_id: &str) -> StoreResult<TaskHandle>;

  async fn get_task_status(&self, task_id: &str) -> StoreResult<TaskStatusResponse>;

  async fn list_reminders(&self, done: Option<bool>) -> StoreResult<Vec<Reminder>>;

  async fn create_reminder(&self, application_id: &str, body: &NewReminder)
    -> StoreResult<Reminder>;

  async fn update_reminder(&self, id: &str, patch: &ReminderPatch) -> StoreResult<Reminder>;

  /// Fails with 404 until the profile is first saved
  async fn get_profile(&self) -> StoreResult<Profile>;

  /// Creates the profile on first save
  async fn update_profile(&self, update: &ProfileUpdate) -> StoreResult<Profile>;
}
