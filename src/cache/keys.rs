//! Query keys and cacheable implementations for backend entities.

use std::fmt;

use crate::api::api_types::ApplicationFilter;
use crate::api::types::{AiOutput, Application, Reminder};

use super::traits::Cacheable;

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Application {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    if self.updated_at.is_empty() {
      None
    } else {
      Some(&self.updated_at)
    }
  }

  fn entity_type() -> &'static str {
    "application"
  }
}

impl Cacheable for AiOutput {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    // Outputs are immutable once written
    None
  }

  fn entity_type() -> &'static str {
    "ai_output"
  }
}

impl Cacheable for Reminder {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    None
  }

  fn entity_type() -> &'static str {
    "reminder"
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Logical key of a cached query: entity collection plus parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
  /// Application list, optionally filtered
  Applications(ApplicationFilter),
  /// A single application
  Application { id: String },
  /// Generated artifacts of one application
  AiOutputs { application_id: String },
  /// Reminder list, optionally by completion
  Reminders { done: Option<bool> },
  /// The current user's profile
  Profile,
}

impl QueryKey {
  /// The unfiltered application list backing the board
  pub fn applications() -> Self {
    Self::Applications(ApplicationFilter::default())
  }

  pub fn application(id: &str) -> Self {
    Self::Application { id: id.to_string() }
  }

  pub fn ai_outputs(application_id: &str) -> Self {
    Self::AiOutputs {
      application_id: application_id.to_string(),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::Applications(filter) => match (&filter.status, &filter.search) {
        (None, None) => "all applications".to_string(),
        (Some(status), None) => format!("applications [{}]", status),
        (None, Some(search)) => format!("applications matching '{}'", search),
        (Some(status), Some(search)) => {
          format!("applications [{}] matching '{}'", status, search)
        }
      },
      Self::Application { id } => format!("application {}", id),
      Self::AiOutputs { application_id } => format!("ai outputs of {}", application_id),
      Self::Reminders { done: None } => "all reminders".to_string(),
      Self::Reminders { done: Some(true) } => "done reminders".to_string(),
      Self::Reminders { done: Some(false) } => "open reminders".to_string(),
      Self::Profile => "profile".to_string(),
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.description())
  }
}
