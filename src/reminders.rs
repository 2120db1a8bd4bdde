//! Follow-up reminders attached to applications.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use thiserror::Error;
use tracing::info;

use crate::api::api_types::{NewReminder, ReminderPatch};
use crate::api::types::Reminder;
use crate::api::RemoteStore;
use crate::cache::{CacheLayer, FetchError, QueryKey};

const DUE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error)]
#[error("invalid due date '{0}': expected YYYY-MM-DD, YYYY-MM-DDTHH:MM[:SS] or RFC 3339")]
pub struct InvalidDueDate(String);

/// Parse a due date typed by the user. Dates without an offset are read in
/// `tz`; a bare date means 09:00 that day.
pub fn parse_due<Tz: TimeZone>(input: &str, tz: &Tz) -> Result<DateTime<Utc>, InvalidDueDate> {
  let input = input.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
    return Ok(dt.with_timezone(&Utc));
  }
  let naive = NaiveDateTime::parse_from_str(input, DUE_FORMAT)
    .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
    .ok()
    .or_else(|| {
      NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(9, 0, 0))
    });
  naive
    .and_then(|naive| tz.from_local_datetime(&naive).earliest())
    .map(|dt| dt.with_timezone(&Utc))
    .ok_or_else(|| InvalidDueDate(input.to_string()))
}

/// Read a `due_at` as sent by the backend. Values without an offset are UTC.
pub fn due_at(reminder: &Reminder) -> Option<DateTime<Utc>> {
  let raw = reminder.due_at.trim();
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
    .or_else(|| {
      NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
    })
}

/// Whether an open reminder is past due at `now`. Unparseable dates are
/// never overdue.
pub fn is_overdue(reminder: &Reminder, now: DateTime<Utc>) -> bool {
  !reminder.done && due_at(reminder).is_some_and(|due| due < now)
}

pub struct Reminders {
  store: Arc<dyn RemoteStore>,
  layer: CacheLayer,
}

impl Reminders {
  pub fn new(store: Arc<dyn RemoteStore>, layer: CacheLayer) -> Self {
    Self { store, layer }
  }

  pub async fn list(&self, done: Option<bool>) -> Result<Vec<Reminder>, FetchError> {
    let store = Arc::clone(&self.store);
    let result = self
      .layer
      .fetch(&QueryKey::Reminders { done }, || async move {
        store.list_reminders(done).await
      })
      .await?;
    Ok(result.data)
  }

  pub async fn create(
    &self,
    application_id: &str,
    text: &str,
    due: DateTime<Utc>,
  ) -> Result<Reminder, FetchError> {
    let body = NewReminder {
      text: text.to_string(),
      due_at: due.to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    let reminder = self.store.create_reminder(application_id, &body).await?;
    info!(reminder = %reminder.id, application = application_id, "reminder created");
    self.invalidate();
    Ok(reminder)
  }

  pub async fn update(&self, id: &str, patch: &ReminderPatch) -> Result<Reminder, FetchError> {
    let reminder = self.store.update_reminder(id, patch).await?;
    info!(reminder = id, done = reminder.done, "reminder updated");
    self.invalidate();
    Ok(reminder)
  }

  pub async fn mark_done(&self, id: &str) -> Result<Reminder, FetchError> {
    let patch = ReminderPatch {
      done: Some(true),
      ..ReminderPatch::default()
    };
    self.update(id, &patch).await
  }

  fn invalidate(&self) {
    for done in [None, Some(false), Some(true)] {
      self.layer.cache().invalidate(&QueryKey::Reminders { done });
    }
  }
}
