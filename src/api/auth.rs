//! Credential providers and the bearer-token request interceptor.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::client::RequestInterceptor;
use crate::error::{ApiError, CredentialError, Result};

/// Source of opaque bearer credentials, asked once per outgoing request.
///
/// `Ok(None)` means "no credential right now" (e.g. signed out).
#[async_trait]
pub trait CredentialProvider: Send + Sync {
  async fn credential(&self) -> Result<Option<String>, CredentialError>;
}

#[async_trait]
impl<F, Fut> CredentialProvider for F
where
  F: Fn() -> Fut + Send + Sync,
  Fut: Future<Output = Result<Option<String>, CredentialError>> + Send,
{
  async fn credential(&self) -> Result<Option<String>, CredentialError> {
    (self)().await
  }
}

/// A fixed credential. Mostly useful for scripts and tests.
#[derive(Clone)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
  pub fn new(token: impl Into<String>) -> Self {
    Self(Some(token.into()))
  }

  pub fn none() -> Self {
    Self(None)
  }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
  async fn credential(&self) -> Result<Option<String>, CredentialError> {
    Ok(self.0.clone())
  }
}

/// Reads the credential from an environment variable on every call.
#[derive(Clone)]
pub struct EnvCredential {
  var: String,
}

impl EnvCredential {
  pub fn new(var: impl Into<String>) -> Self {
    Self { var: var.into() }
  }
}

#[async_trait]
impl CredentialProvider for EnvCredential {
  async fn credential(&self) -> Result<Option<String>, CredentialError> {
    Ok(std::env::var(&self.var).ok())
  }
}

/// Runs a shell command per call and uses its trimmed stdout as the credential.
#[derive(Clone)]
pub struct CommandCredential {
  command: String,
}

impl CommandCredential {
  pub fn new(command: impl Into<String>) -> Self {
    Self {
      command: command.into(),
    }
  }
}

#[async_trait]
impl CredentialProvider for CommandCredential {
  async fn credential(&self) -> Result<Option<String>, CredentialError> {
    let output = tokio::process::Command::new("sh")
      .arg("-c")
      .arg(&self.command)
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|e| CredentialError::Command {
        command: self.command.clone(),
        reason: e.to_string(),
      })?;

    if !output.status.success() {
      return Err(CredentialError::Command {
        command: self.command.clone(),
        reason: format!(
          "exited with {}: {}",
          output.status,
          String::from_utf8_lossy(&output.stderr).trim()
        ),
      });
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(Some(token))
  }
}

/// What to do when no credential can be attached to a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
  /// Send the request without `Authorization`; the server decides.
  #[default]
  Optional,
  /// Fail with [`ApiError::AuthUnavailable`] before dispatch.
  Required,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
  pub mode: AuthMode,
  /// Upper bound on a single credential lookup.
  pub timeout: Duration,
}

impl AuthPolicy {
  pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

  pub fn optional() -> Self {
    Self {
      mode: AuthMode::Optional,
      timeout: Self::DEFAULT_TIMEOUT,
    }
  }

  pub fn required() -> Self {
    Self {
      mode: AuthMode::Required,
      timeout: Self::DEFAULT_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

impl Default for AuthPolicy {
  fn default() -> Self {
    Self::optional()
  }
}

/// Interceptor that asks the provider for a credential on every request and
/// sets `Authorization: Bearer <credential>` on that request only.
#[derive(Clone)]
pub struct BearerAuth {
  provider: Arc<dyn CredentialProvider>,
  policy: AuthPolicy,
}

impl BearerAuth {
  pub fn new(provider: impl CredentialProvider + 'static, policy: AuthPolicy) -> Self {
    Self {
      provider: Arc::new(provider),
      policy,
    }
  }

  pub fn policy(&self) -> AuthPolicy {
    self.policy
  }

  /// Fetch a header value, treating blank credentials as absent.
  async fn header_value(&self) -> Result<Option<HeaderValue>, CredentialError> {
    let credential = tokio::time::timeout(self.policy.timeout, self.provider.credential())
      .await
      .map_err(|_| CredentialError::Timeout(self.policy.timeout))??;

    let Some(token) = credential.filter(|t| !t.trim().is_empty()) else {
      return Ok(None);
    };

    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(|_| {
      CredentialError::Provider("credential is not a valid header value".to_string())
    })?;
    value.set_sensitive(true);
    Ok(Some(value))
  }
}

#[async_trait]
impl RequestInterceptor for BearerAuth {
  async fn intercept(&self, mut request: reqwest::Request) -> Result<reqwest::Request> {
    let required = self.policy.mode == AuthMode::Required;

    match self.header_value().await {
      Ok(Some(value)) => {
        request.headers_mut().insert(AUTHORIZATION, value);
      }
      Ok(None) if required => {
        return Err(ApiError::AuthUnavailable(
          "no credential available".to_string(),
        ));
      }
      Ok(None) => {
        debug!(url = %request.url(), "no credential, sending unauthenticated");
      }
      Err(e) if required => return Err(ApiError::AuthUnavailable(e.to_string())),
      Err(e) => {
        warn!(url = %request.url(), error = %e, "credential lookup failed, sending unauthenticated");
      }
    }

    Ok(request)
  }
}
