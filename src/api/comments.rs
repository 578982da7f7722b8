use super::client::ApiClient;
use super::types::{require_id, Ack, CreateCommentRequest};
use crate::error::Result;

/// `POST /comments/post/{postId}` with body `{content}`.
pub async fn create_comment(api: &ApiClient, post_id: &str, content: &str) -> Result<Ack> {
  let post_id = require_id("post id", post_id)?;
  let request = CreateCommentRequest::new(content)?;
  api.post_json(&["comments", "post", post_id], &request).await
}
