//! One signed-in client: resolved base address, authenticated transport and
//! the shared post cache.

use tracing::info;

use crate::api::auth::{BearerAuth, CredentialProvider};
use crate::api::client::ApiClient;
use crate::api::types::Post;
use crate::cache::QueryClient;
use crate::config::Config;
use crate::endpoint;
use crate::error::Result;
use crate::feed::PostFeed;

/// Owns everything requests and cached reads share. Cheap to clone; clones
/// share the cache.
#[derive(Clone, Debug)]
pub struct Session {
  api: ApiClient,
  cache: QueryClient<Vec<Post>>,
}

impl Session {
  /// Resolve the base address once and build the clients.
  ///
  /// The address comes from `FEEDLINE_API_URL`, then `api.url`, then the
  /// platform default.
  pub fn new(config: &Config, provider: impl CredentialProvider + 'static) -> Result<Self> {
    Self::build(config, endpoint::env_override(), provider)
  }

  pub(crate) fn build(
    config: &Config,
    env_override: Option<String>,
    provider: impl CredentialProvider + 'static,
  ) -> Result<Self> {
    let platform = config.platform();
    let base_address = base_address_for(config, env_override);
    info!(base_address = %base_address, platform = %platform, "resolved API base address");

    let api = ApiClient::with_timeout(&base_address, config.api_timeout())?
      .with_interceptor(BearerAuth::new(provider, config.auth_policy()));

    Ok(Self {
      api,
      cache: QueryClient::with_stale_time(config.stale_time()),
    })
  }

  pub fn api(&self) -> &ApiClient {
    &self.api
  }

  pub fn cache(&self) -> &QueryClient<Vec<Post>> {
    &self.cache
  }

  pub fn base_address(&self) -> &str {
    self.api.base_address()
  }

  /// The global feed, or one user's posts.
  pub fn feed(&self, username: Option<&str>) -> PostFeed {
    PostFeed::new(self, username.map(str::to_string))
  }

  /// Forget all cached data.
  pub fn sign_out(&self) {
    info!("signing out, dropping cached data");
    self.cache.clear();
  }
}

fn base_address_for(config: &Config, env_override: Option<String>) -> String {
  let explicit = env_override
    .filter(|url| !url.trim().is_empty())
    .or_else(|| config.api.url.clone());
  endpoint::resolve(explicit.as_deref(), config.platform())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::auth::StaticCredential;
  use crate::cache::QueryKey;
  use crate::config::ApiConfig;
  use crate::endpoint::Platform;
  use crate::error::ApiError;

  fn config(url: Option<&str>, platform: Platform) -> Config {
    Config {
      api: ApiConfig {
        url: url.map(str::to_string),
        platform: Some(platform),
        ..Default::default()
      },
      ..Default::default()
    }
  }

  #[test]
  fn test_base_address_priority() {
    let android = config(None, Platform::Android);
    assert_eq!(base_address_for(&android, None), "http://10.0.2.2:5001/api");

    let configured = config(Some("https://api.example.com/"), Platform::Android);
    assert_eq!(
      base_address_for(&configured, None),
      "https://api.example.com/api"
    );
    assert_eq!(
      base_address_for(&configured, Some("http://192.168.1.20:5001".to_string())),
      "http://192.168.1.20:5001/api"
    );
    assert_eq!(
      base_address_for(&configured, Some("  ".to_string())),
      "https://api.example.com/api"
    );
  }

  #[tokio::test]
  async fn test_session_resolves_once_and_signs_out() {
    let session = Session::build(
      &config(Some("http://localhost:5001"), Platform::Other),
      None,
      StaticCredential::none(),
    )
    .unwrap();
    assert_eq!(session.base_address(), "http://localhost:5001/api");
    assert_eq!(session.feed(Some("alice")).key(), QueryKey::user_posts("alice"));
    assert_eq!(session.feed(None).key(), QueryKey::Posts);

    session
      .cache()
      .fetch(QueryKey::Posts, || async { Ok::<_, ApiError>(Vec::new()) })
      .await
      .unwrap();
    session.sign_out();
    assert!(session.cache().keys().is_empty());
  }

  #[test]
  fn test_invalid_configured_address_is_rejected() {
    let result = Session::build(
      &config(Some("ftp://files.example.com"), Platform::Other),
      None,
      StaticCredential::none(),
    );
    assert!(matches!(
      result,
      Err(ApiError::InvalidBaseAddress { .. })
    ));
  }
}
