use crate::api::api_types::{
  ApiErrorBody, ApplicationFilter, ApplicationPatch, NewApplication, NewReminder, ProfileUpdate,
  ReminderPatch, TaskHandle, TaskStatusResponse,
};
use crate::api::error::StoreError;
use crate::api::remote::{RemoteStore, StoreResult};
use crate::api::types::{AiKind, AiOutput, Application, Profile, Reminder};
use crate::config::Config;
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for the application backend
#[derive(Clone)]
pub struct HttpStore {
  client: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl HttpStore {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid API url '{}': {}", config.api.url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Invalid API url '{}': not a base url", config.api.url));
    }

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token: Config::api_token(),
    })
  }

  /// Build an endpoint url below the configured base, escaping each segment
  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
    match &self.token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> StoreResult<T> {
    let resp = self.authorize(req).send().await?;
    let status = resp.status();
    debug!(url = %resp.url(), status = status.as_u16(), "backend response");

    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(error_from_response(status, &body));
    }

    resp
      .json::<T>()
      .await
      .map_err(|e| StoreError::Decode(e.to_string()))
  }
}

/// Normalize a non-success response into a `StoreError`
fn error_from_response(status: StatusCode, body: &str) -> StoreError {
  if status == StatusCode::UNAUTHORIZED {
    return StoreError::Unauthorized;
  }

  let message = serde_json::from_str::<ApiErrorBody>(body)
    .map(|b| b.message())
    .ok()
    .filter(|m| !m.is_empty())
    .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
    .unwrap_or_else(|| {
      status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
    });

  StoreError::http(status.as_u16(), message)
}

#[async_trait]
impl RemoteStore for HttpStore {
  async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<Application>> {
    let req = self
      .client
      .get(self.endpoint(&["applications"]))
      .query(&filter.query_pairs());
    self.send(req).await
  }

  async fn get_application(&self, id: &str) -> StoreResult<Application> {
    self
      .send(self.client.get(self.endpoint(&["applications", id])))
      .await
  }

  async fn create_application(&self, body: &NewApplication) -> StoreResult<Application> {
    let req = self
      .client
      .post(self.endpoint(&["applications"]))
      .json(body);
    self.send(req).await
  }

  async fn update_application(
    &self,
    id: &str,
    patch: &ApplicationPatch,
  ) -> StoreResult<Application> {
    let req = self
      .client
      .patch(self.endpoint(&["applications", id]))
      .json(patch);
    self.send(req).await
  }

  async fn list_ai_outputs(&self, application_id: &str) -> StoreResult<Vec<AiOutput>> {
    let url = self.endpoint(&["applications", application_id, "ai-outputs"]);
    self.send(self.client.get(url)).await
  }

  async fn submit_ai_task(&self, kind: AiKind, application_id: &str) -> StoreResult<TaskHandle> {
    let url = self.endpoint(&["ai", kind.slug(), application_id]);
    self.send(self.client.post(url)).await
  }

  async fn get_task_status(&self, task_id: &str) -> StoreResult<TaskStatusResponse> {
    let url = self.endpoint(&["ai", "tasks", task_id]);
    self.send(self.client.get(url)).await
  }

  async fn list_reminders(&self, done: Option<bool>) -> StoreResult<Vec<Reminder>> {
    let mut req = self.client.get(self.endpoint(&["reminders"]));
    if let Some(done) = done {
      req = req.query(&[("done", done)]);
    }
    self.send(req).await
  }

  async fn create_reminder(
    &self,
    application_id: &str,
    body: &NewReminder,
  ) -> StoreResult<Reminder> {
    let url = self.endpoint(&["applications", application_id, "reminders"]);
    self.send(self.client.post(url).json(body)).await
  }

  async fn update_reminder(&self, id: &str, patch: &ReminderPatch) -> StoreResult<Reminder> {
    let url = self.endpoint(&["reminders", id]);
    self.send(self.client.patch(url).json(patch)).await
  }

  async fn get_profile(&self) -> StoreResult<Profile> {
    self.send(self.client.get(self.endpoint(&["profile"]))).await
  }

  async fn update_profile(&self, update: &ProfileUpdate) -> StoreResult<Profile> {
    let req = self.client.put(self.endpoint(&["profile"])).json(update);
    self.send(req).await
  }
}
