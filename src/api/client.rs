use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::auth::{AuthPolicy, BearerAuth, CredentialProvider};
use crate::error::{ApiError, Result};

/// Hook run on every outgoing request, in registration order, right before
/// dispatch. Returning an error aborts the request without touching the network.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
  async fn intercept(&self, request: reqwest::Request) -> Result<reqwest::Request>;
}

/// HTTP client bound to one backend base address.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  base_address: String,
  interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl ApiClient {
  pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

  pub fn new(base_address: &str) -> Result<Self> {
    Self::with_timeout(base_address, Self::DEFAULT_TIMEOUT)
  }

  pub fn with_timeout(base_address: &str, timeout: Duration) -> Result<Self> {
    let base = parse_base(base_address)?;
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|source| ApiError::Transport {
        url: base_address.to_string(),
        source,
      })?;

    Ok(Self {
      http,
      base,
      base_address: base_address.to_string(),
      interceptors: Vec::new(),
    })
  }

  /// Client that attaches a fresh bearer credential to every request.
  pub fn authenticated(
    base_address: &str,
    provider: impl CredentialProvider + 'static,
    policy: AuthPolicy,
  ) -> Result<Self> {
    Ok(Self::new(base_address)?.with_interceptor(BearerAuth::new(provider, policy)))
  }

  pub fn with_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
    self.interceptors.push(Arc::new(interceptor));
    self
  }

  pub fn base_address(&self) -> &str {
    &self.base_address
  }

  /// Build a URL under the base address. Segments are percent-encoded.
  pub fn url(&self, segments: &[&str]) -> Result<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| ApiError::InvalidBaseAddress {
        address: self.base_address.clone(),
        reason: "cannot be a base".to_string(),
      })?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  pub async fn get<R: DeserializeOwned>(&self, segments: &[&str]) -> Result<R> {
    self.send(Method::GET, segments, None::<&()>).await
  }

  pub async fn post<R: DeserializeOwned>(&self, segments: &[&str]) -> Result<R> {
    self.send(Method::POST, segments, None::<&()>).await
  }

  pub async fn post_json<B, R>(&self, segments: &[&str], body: &B) -> Result<R>
  where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
  {
    self.send(Method::POST, segments, Some(body)).await
  }

  pub async fn put_json<B, R>(&self, segments: &[&str], body: &B) -> Result<R>
  where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
  {
    self.send(Method::PUT, segments, Some(body)).await
  }

  pub async fn delete<R: DeserializeOwned>(&self, segments: &[&str]) -> Result<R> {
    self.send(Method::DELETE, segments, None::<&()>).await
  }

  async fn send<B, R>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<R>
  where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
  {
    let url = self.url(segments)?;
    let url_str = url.to_string();

    let mut builder = self.http.request(method, url);
    if let Some(body) = body {
      builder = builder.json(body);
    }
    let mut request = builder.build().map_err(|source| ApiError::Transport {
      url: url_str.clone(),
      source,
    })?;

    for interceptor in &self.interceptors {
      request = interceptor.intercept(request).await?;
    }

    debug!(method = %request.method(), url = %url_str, "dispatching request");

    let response = self
      .http
      .execute(request)
      .await
      .map_err(|source| ApiError::Transport {
        url: url_str.clone(),
        source,
      })?;

    let status = response.status();
    let bytes = response.bytes().await.map_err(|source| ApiError::Transport {
      url: url_str.clone(),
      source,
    })?;

    debug!(status = status.as_u16(), url = %url_str, "response received");

    if !status.is_success() {
      return Err(status_error(status, url_str, &bytes));
    }

    decode_body(&url_str, &bytes)
  }
}

impl std::fmt::Debug for ApiClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ApiClient")
      .field("base_address", &self.base_address)
      .field("interceptors", &self.interceptors.len())
      .finish_non_exhaustive()
  }
}

fn parse_base(base_address: &str) -> Result<Url> {
  let invalid = |reason: String| ApiError::InvalidBaseAddress {
    address: base_address.to_string(),
    reason,
  };

  let url = Url::parse(base_address).map_err(|e| invalid(e.to_string()))?;
  if !matches!(url.scheme(), "http" | "https") {
    return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
  }
  if url.cannot_be_a_base() {
    return Err(invalid("cannot be a base".to_string()));
  }
  Ok(url)
}

fn status_error(status: StatusCode, url: String, body: &[u8]) -> ApiError {
  match status {
    StatusCode::NOT_FOUND => ApiError::NotFound { url },
    StatusCode::FORBIDDEN => ApiError::Forbidden { url },
    _ => ApiError::Status {
      status,
      url,
      message: error_message(status, body),
    },
  }
}

/// Prefer the server's `error`/`message` field, then the raw body.
fn error_message(status: StatusCode, body: &[u8]) -> String {
  if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(body) {
    for field in ["error", "message"] {
      if let Some(msg) = map.get(field).and_then(|v| v.as_str()) {
        return msg.to_string();
      }
    }
  }

  let text = String::from_utf8_lossy(body).trim().to_string();
  if text.is_empty() {
    status.canonical_reason().unwrap_or("unknown error").to_string()
  } else {
    text
  }
}

/// Decode a success body. An empty body decodes as `{}`.
fn decode_body<R: DeserializeOwned>(url: &str, bytes: &[u8]) -> Result<R> {
  let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
    b"{}"
  } else {
    bytes
  };
  serde_json::from_slice(bytes).map_err(|source| ApiError::Decode {
    url: url.to_string(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::auth::{AuthMode, StaticCredential};
  use crate::api::types::{Ack, PostsResponse};
  use crate::error::CredentialError;
  use reqwest::header::AUTHORIZATION;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use wiremock::matchers::{body_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn base(server: &MockServer) -> String {
    format!("{}/api", server.uri())
  }

  #[test]
  fn test_rejects_invalid_base_address() {
    assert!(matches!(
      ApiClient::new("not a url"),
      Err(ApiError::InvalidBaseAddress { .. })
    ));
    assert!(matches!(
      ApiClient::new("ftp://example.com/api"),
      Err(ApiError::InvalidBaseAddress { .. })
    ));
  }

  #[test]
  fn test_url_building_encodes_segments() {
    let client = ApiClient::new("http://localhost:5001/api").unwrap();
    assert_eq!(
      client.url(&["posts", "user", "a b/c"]).unwrap().as_str(),
      "http://localhost:5001/api/posts/user/a%20b%2Fc"
    );
    assert_eq!(client.base_address(), "http://localhost:5001/api");
  }

  #[tokio::test]
  async fn test_attaches_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/posts"))
      .and(header("authorization", "Bearer tok-1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "posts": [] })))
      .expect(1)
      .mount(&server)
      .await;

    let client =
      ApiClient::authenticated(&base(&server), StaticCredential::new("tok-1"), AuthPolicy::default())
        .unwrap();
    let resp: PostsResponse = client.get(&["posts"]).await.unwrap();
    assert!(resp.posts.is_empty());
  }

  #[tokio::test]
  async fn test_credential_fetched_per_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/users/sync"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let provider = move || {
      let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
      async move { Ok::<_, CredentialError>(Some(format!("tok-{}", n))) }
    };
    let client = ApiClient::authenticated(&base(&server), provider, AuthPolicy::default()).unwrap();

    let _: Ack = client.post(&["users", "sync"]).await.unwrap();
    let _: Ack = client.post(&["users", "sync"]).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let received = server.received_requests().await.unwrap();
    let headers: Vec<_> = received
      .iter()
      .map(|r| r.headers.get(AUTHORIZATION).unwrap().to_str().unwrap().to_string())
      .collect();
    assert_eq!(headers, vec!["Bearer tok-1", "Bearer tok-2"]);
  }

  #[tokio::test]
  async fn test_missing_credential_sends_without_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/posts"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "posts": [] })))
      .mount(&server)
      .await;

    let client =
      ApiClient::authenticated(&base(&server), StaticCredential::none(), AuthPolicy::default())
        .unwrap();
    let _: PostsResponse = client.get(&["posts"]).await.unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get(AUTHORIZATION).is_none());
  }

  #[tokio::test]
  async fn test_required_auth_fails_before_dispatch() {
    let server = MockServer::start().await;
    let policy = AuthPolicy {
      mode: AuthMode::Required,
      ..AuthPolicy::default()
    };
    let client = ApiClient::authenticated(&base(&server), StaticCredential::none(), policy).unwrap();

    let err = client.get::<PostsResponse>(&["posts"]).await.unwrap_err();
    assert!(matches!(err, ApiError::AuthUnavailable(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/api/posts/missing"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/api/posts/theirs"))
      .respond_with(ResponseTemplate::new(403))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/posts"))
      .respond_with(
        ResponseTemplate::new(500).set_body_json(serde_json::json!({ "error": "db down" })),
      )
      .mount(&server)
      .await;

    let client = ApiClient::new(&base(&server)).unwrap();

    let err = client.delete::<Ack>(&["posts", "missing"]).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));

    let err = client.delete::<Ack>(&["posts", "theirs"]).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden { .. }));

    let err = client.get::<PostsResponse>(&["posts"]).await.unwrap_err();
    match err {
      ApiError::Status {
        status, message, ..
      } => {
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "db down");
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_json_body_and_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/comments/post/p1"))
      .and(body_json(serde_json::json!({ "content": "nice" })))
      .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "message": "ok" })))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/users/me"))
      .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
      .mount(&server)
      .await;

    let client = ApiClient::new(&base(&server)).unwrap();
    let ack: Ack = client
      .post_json(&["comments", "post", "p1"], &serde_json::json!({ "content": "nice" }))
      .await
      .unwrap();
    assert_eq!(ack.message.as_deref(), Some("ok"));

    let err = client.get::<serde_json::Value>(&["users", "me"]).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
  }

  #[tokio::test]
  async fn test_transport_error() {
    // Nothing listens on port 9 locally.
    let client = ApiClient::with_timeout("http://127.0.0.1:9/api", Duration::from_secs(2)).unwrap();
    let err = client.get::<PostsResponse>(&["posts"]).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
    assert!(err.is_network());
  }
}
