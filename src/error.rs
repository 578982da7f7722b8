//! Error types for the data-access layer.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced by the authenticated transport and the resource functions.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The request never produced a response (connection, TLS, timeout).
  #[error("request to {url} failed: {source}")]
  Transport {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The server answered with a non-success status not mapped below.
  #[error("server returned {status} for {url}: {message}")]
  Status {
    status: StatusCode,
    url: String,
    message: String,
  },

  #[error("not found: {url}")]
  NotFound { url: String },

  #[error("forbidden: {url}")]
  Forbidden { url: String },

  /// A credential was required but the provider failed, timed out or had none.
  #[error("credential unavailable: {0}")]
  AuthUnavailable(String),

  #[error("failed to decode response from {url}: {source}")]
  Decode {
    url: String,
    #[source]
    source: serde_json::Error,
  },

  /// Rejected at the request boundary, before dispatch.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("invalid base address {address}: {reason}")]
  InvalidBaseAddress { address: String, reason: String },
}

impl ApiError {
  /// HTTP status carried by the error, if the server answered.
  pub fn status(&self) -> Option<StatusCode> {
    match self {
      Self::Status { status, .. } => Some(*status),
      Self::NotFound { .. } => Some(StatusCode::NOT_FOUND),
      Self::Forbidden { .. } => Some(StatusCode::FORBIDDEN),
      Self::Transport { source, .. } => source.status(),
      _ => None,
    }
  }

  /// True for transport failures and server-side status errors.
  pub fn is_network(&self) -> bool {
    matches!(
      self,
      Self::Transport { .. } | Self::Status { .. } | Self::NotFound { .. } | Self::Forbidden { .. }
    )
  }
}

/// Failure reported by a credential provider.
#[derive(Debug, Error)]
pub enum CredentialError {
  #[error("credential provider failed: {0}")]
  Provider(String),

  #[error("credential command `{command}` failed: {reason}")]
  Command { command: String, reason: String },

  #[error("credential provider timed out after {0:?}")]
  Timeout(std::time::Duration),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
