use super::client::ApiClient;
use super::types::{require_id, Ack, CreatePostRequest, PostsResponse};
use crate::error::Result;

/// `POST /posts`
pub async fn create_post(api: &ApiClient, request: &CreatePostRequest) -> Result<Ack> {
  api.post_json(&["posts"], request).await
}

/// `GET /posts`: the global feed.
pub async fn list_posts(api: &ApiClient) -> Result<PostsResponse> {
  api.get(&["posts"]).await
}

/// `GET /posts/user/{username}`
pub async fn list_user_posts(api: &ApiClient, username: &str) -> Result<PostsResponse> {
  let username = require_id("username", username)?;
  api.get(&["posts", "user", username]).await
}

/// `POST /posts/{id}/like`: the server toggles the like for the caller.
pub async fn like_post(api: &ApiClient, post_id: &str) -> Result<Ack> {
  let post_id = require_id("post id", post_id)?;
  api.post(&["posts", post_id, "like"]).await
}

/// `DELETE /posts/{id}`
pub async fn delete_post(api: &ApiClient, post_id: &str) -> Result<Ack> {
  let post_id = require_id("post id", post_id)?;
  api.delete(&["posts", post_id]).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ApiError;
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn setup() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let api = ApiClient::new(&format!("{}/api", server.uri())).unwrap();
    (server, api)
  }

  #[tokio::test]
  async fn test_routes() {
    let (server, api) = setup().await;
    let posts = serde_json::json!({ "posts": [{ "_id": "p1", "content": "hi", "likes": [] }] });

    Mock::given(method("GET"))
      .and(path("/api/posts"))
      .respond_with(ResponseTemplate::new(200).set_body_json(posts.clone()))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/posts/user/alice"))
      .respond_with(ResponseTemplate::new(200).set_body_json(posts))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/posts/p1/like"))
      .respond_with(ResponseTemplate::new(200))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/api/posts/p1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "message": "deleted" })))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/posts"))
      .and(body_json(serde_json::json!({ "content": "new" })))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    assert_eq!(list_posts(&api).await.unwrap().posts[0].id, "p1");
    assert_eq!(list_user_posts(&api, "alice").await.unwrap().posts.len(), 1);
    assert_eq!(like_post(&api, "p1").await.unwrap(), Ack::default());
    assert_eq!(
      delete_post(&api, "p1").await.unwrap().message.as_deref(),
      Some("deleted")
    );
    create_post(&api, &CreatePostRequest::new("new", None).unwrap())
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_empty_ids_rejected_before_dispatch() {
    let (server, api) = setup().await;

    assert!(matches!(
      like_post(&api, " ").await,
      Err(ApiError::InvalidRequest(_))
    ));
    assert!(matches!(
      list_user_posts(&api, "").await,
      Err(ApiError::InvalidRequest(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
  }
}
