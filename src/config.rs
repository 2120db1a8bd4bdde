use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::types::ApplicationStatus;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub polling: PollingConfig,
  #[serde(default)]
  pub board: BoardConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base url of the backend, including the version prefix
  #[serde(default = "default_url")]
  pub url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout")]
  pub timeout_secs: u64,
}

fn default_url() -> String {
  DEFAULT_API_URL.to_string()
}

fn default_timeout() -> u64 {
  30
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_url(),
      timeout_secs: default_timeout(),
    }
  }
}

/// How AI tasks are polled until they settle.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
  #[serde(default = "default_interval")]
  pub interval_ms: u64,
  /// Polls before a task is reported as timed out
  #[serde(default = "default_max_polls")]
  pub max_polls: u32,
}

fn default_interval() -> u64 {
  1500
}

fn default_max_polls() -> u32 {
  30
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      interval_ms: default_interval(),
      max_polls: default_max_polls(),
    }
  }
}

impl PollingConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_millis(self.interval_ms)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardConfig {
  /// Status columns to hide in the board view (case-insensitive)
  #[serde(default, deserialize_with = "deserialize_lowercase_set")]
  pub hide_columns: BTreeSet<String>,
}

impl BoardConfig {
  pub fn is_hidden(&self, status: ApplicationStatus) -> bool {
    let hidden = &self.hide_columns;
    hidden.contains(status.as_str()) || hidden.contains(&status.label().to_lowercase())
  }
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.trim().to_lowercase()).collect())
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./applytrack.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/applytrack/config.yaml
  ///
  /// Without any file the defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("applytrack.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("applytrack").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    if config.polling.max_polls == 0 {
      return Err(eyre!(
        "Invalid config file {}: polling.max_polls must be at least 1",
        path.display()
      ));
    }

    Ok(config)
  }

  /// Bearer token for the backend.
  ///
  /// Checks APPLYTRACK_TOKEN first, then APPLYTRACK_API_TOKEN as fallback.
  pub fn api_token() -> Option<String> {
    std::env::var("APPLYTRACK_TOKEN")
      .or_else(|_| std::env::var("APPLYTRACK_API_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
