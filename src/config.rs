use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::auth::AuthPolicy;
use crate::api::client::ApiClient;
use crate::endpoint::Platform;

/// Environment variable the CLI reads the bearer credential from when no
/// `auth.token_command` is configured.
pub const TOKEN_ENV: &str = "FEEDLINE_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub auth: AuthConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base address override; `FEEDLINE_API_URL` still wins over it
  pub url: Option<String>,
  /// Platform used to pick the default address (detected if not set)
  pub platform: Option<Platform>,
  #[serde(default = "default_api_timeout")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: None,
      platform: None,
      timeout_secs: default_api_timeout(),
    }
  }
}

fn default_api_timeout() -> u64 {
  ApiClient::DEFAULT_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
  /// Fail requests that have no credential instead of sending them bare
  #[serde(default)]
  pub required: bool,
  /// Shell command printing the bearer credential on stdout
  pub token_command: Option<String>,
  #[serde(default = "default_auth_timeout")]
  pub timeout_secs: u64,
}

impl Default for AuthConfig {
  fn default() -> Self {
    Self {
      required: false,
      token_command: None,
      timeout_secs: default_auth_timeout(),
    }
  }
}

fn default_auth_timeout() -> u64 {
  AuthPolicy::DEFAULT_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Seconds before fetched data goes stale on its own. Unset means data
  /// stays fresh until a write invalidates it.
  pub stale_time_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Log file (default: $XDG_DATA_HOME/feedline/feedline.log)
  pub file: Option<PathBuf>,
  /// Log to stderr instead of the file
  #[serde(default)]
  pub stderr: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
      stderr: false,
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl LogConfig {
  pub fn file_path(&self) -> PathBuf {
    self.file.clone().unwrap_or_else(|| {
      dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("feedline")
        .join("feedline.log")
    })
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./feedline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/feedline/config.yaml
  ///
  /// Without a file every setting takes its default.
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
    // Check current directory
    let local = PathBuf::from("feedline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("feedline").join("config.yaml");
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

    Ok(config)
  }

  pub fn platform(&self) -> Platform {
    self.api.platform.unwrap_or_else(Platform::detect)
  }

  pub fn api_timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn auth_policy(&self) -> AuthPolicy {
    let policy = if self.auth.required {
      AuthPolicy::required()
    } else {
      AuthPolicy::optional()
    };
    policy.with_timeout(Duration::from_secs(self.auth.timeout_secs))
  }

  pub fn stale_time(&self) -> Option<chrono::Duration> {
    self
      .cache
      .stale_time_secs
      .and_then(|secs| chrono::Duration::try_seconds(i64::try_from(secs).ok()?))
  }
}
