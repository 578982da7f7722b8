//! Base address resolution.
//!
//! Priority order:
//! 1. Explicit override (`FEEDLINE_API_URL` or config)
//! 2. Android: the emulator's host loopback (10.0.2.2). A physical device
//!    cannot reach it; set an override with the machine's LAN address.
//! 3. iOS simulator: localhost
//! 4. Anything else: localhost

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Environment variable holding the explicit base address override.
pub const API_URL_ENV: &str = "FEEDLINE_API_URL";

pub const ANDROID_EMULATOR_BASE: &str = "http://10.0.2.2:5001";
pub const IOS_SIMULATOR_BASE: &str = "http://localhost:5001";
pub const FALLBACK_BASE: &str = "http://localhost:5001";

/// Path prefix every backend route lives under.
pub const API_PREFIX: &str = "/api";

/// Runtime platform the client is running on.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  Android,
  Ios,
  #[default]
  Other,
}

impl Platform {
  /// Platform of the current build target.
  pub fn detect() -> Self {
    if cfg!(target_os = "android") {
      Platform::Android
    } else if cfg!(target_os = "ios") {
      Platform::Ios
    } else {
      Platform::Other
    }
  }
}

impl FromStr for Platform {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "android" => Ok(Platform::Android),
      "ios" => Ok(Platform::Ios),
      "other" => Ok(Platform::Other),
      other => Err(format!(
        "unknown platform '{}', expected android, ios or other",
        other
      )),
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Platform::Android => "android",
      Platform::Ios => "ios",
      Platform::Other => "other",
    };
    f.write_str(name)
  }
}

/// Resolve the base address for all requests.
///
/// A blank override counts as absent. Every result is normalized with
/// [`ensure_api_prefix`].
pub fn resolve(explicit_override: Option<&str>, platform: Platform) -> String {
  if let Some(explicit) = explicit_override.map(str::trim).filter(|s| !s.is_empty()) {
    return ensure_api_prefix(explicit);
  }

  let default = match platform {
    Platform::Android => ANDROID_EMULATOR_BASE,
    Platform::Ios => IOS_SIMULATOR_BASE,
    Platform::Other => FALLBACK_BASE,
  };
  ensure_api_prefix(default)
}

/// The override from [`API_URL_ENV`], if set and not blank.
pub fn env_override() -> Option<String> {
  std::env::var(API_URL_ENV)
    .ok()
    .filter(|url| !url.trim().is_empty())
}

/// Resolve using the override from [`API_URL_ENV`].
pub fn resolve_from_env(platform: Platform) -> String {
  resolve(env_override().as_deref(), platform)
}

/// Strip trailing slashes and append [`API_PREFIX`] if it is not already the
/// last path segment.
pub fn ensure_api_prefix(url: &str) -> String {
  let trimmed = url.trim_end_matches('/');
  if trimmed.ends_with(API_PREFIX) {
    trimmed.to_string()
  } else {
    format!("{}{}", trimmed, API_PREFIX)
  }
}
