use thiserror::Error;

/// Normalized failure of a backend request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  /// Non-success HTTP status with the backend's message
  #[error("request failed ({status}): {message}")]
  Http { status: u16, message: String },

  /// Missing or rejected bearer token
  #[error("not authenticated; set APPLYTRACK_TOKEN")]
  Unauthorized,

  /// Connection, timeout or TLS failure
  #[error("network error: {0}")]
  Network(String),

  /// Response body did not match the expected shape
  #[error("failed to decode response: {0}")]
  Decode(String),
}

impl StoreError {
  pub fn http(status: u16, message: impl Into<String>) -> Self {
    Self::Http {
      status,
      message: message.into(),
    }
  }

  /// HTTP-style status, when the failure came from the server
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Http { status, .. } => Some(*status),
      Self::Unauthorized => Some(401),
      Self::Network(_) | Self::Decode(_) => None,
    }
  }

  pub fn is_not_found(&self) -> bool {
    self.status() == Some(404)
  }
}

impl From<reqwest::Error> for StoreError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      Self::Decode(e.to_string())
    } else if let Some(status) = e.status() {
      Self::http(status.as_u16(), e.to_string())
    } else {
      Self::Network(e.to_string())
    }
  }
}
