//! Request and response schemas for the backend REST surface.
//!
//! Response types are lenient (`#[serde(default)]` on everything optional) so
//! that a backend adding fields or omitting empty ones does not break decoding.
//! Request types are validated when they are constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

// ============================================================================
// Entities
// ============================================================================

/// Author summary embedded in posts and comments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub first_name: Option<String>,
  #[serde(default)]
  pub last_name: Option<String>,
  #[serde(default)]
  pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(default)]
  pub user: Option<Author>,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

/// A post as owned by the server. Never mutated locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(default)]
  pub user: Author,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub image: Option<String>,
  /// Ids of the users who liked this post.
  #[serde(default)]
  pub likes: Vec<String>,
  #[serde(default)]
  pub comments: Vec<Comment>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
}

impl Post {
  pub fn like_count(&self) -> usize {
    self.likes.len()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub first_name: Option<String>,
  #[serde(default)]
  pub last_name: Option<String>,
  #[serde(default)]
  pub bio: Option<String>,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub profile_picture: Option<String>,
}

// ============================================================================
// Response envelopes
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostsResponse {
  #[serde(default)]
  pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
  pub user: User,
}

/// Acknowledgement for writes. Servers may answer with an empty body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Ack {
  #[serde(default)]
  pub message: Option<String>,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePostRequest {
  pub content: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
}

impl CreatePostRequest {
  /// A post must carry text or an image.
  pub fn new(content: impl Into<String>, image: Option<String>) -> Result<Self> {
    let content = content.into();
    let image = image.filter(|i| !i.trim().is_empty());
    if content.trim().is_empty() && image.is_none() {
      return Err(ApiError::InvalidRequest(
        "post needs content or an image".to_string(),
      ));
    }
    Ok(Self { content, image })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bio: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
}

impl UpdateProfileRequest {
  pub fn is_empty(&self) -> bool {
    self.first_name.is_none()
      && self.last_name.is_none()
      && self.bio.is_none()
      && self.location.is_none()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCommentRequest {
  pub content: String,
}

impl CreateCommentRequest {
  pub fn new(content: impl Into<String>) -> Result<Self> {
    let content = content.into();
    if content.trim().is_empty() {
      return Err(ApiError::InvalidRequest(
        "comment content cannot be empty".to_string(),
      ));
    }
    Ok(Self { content })
  }
}

/// Reject empty ids before they turn into a different route.
pub(crate) fn require_id<'a>(kind: &str, id: &'a str) -> Result<&'a str> {
  let id = id.trim();
  if id.is_empty() {
    return Err(ApiError::InvalidRequest(format!("{} cannot be empty", kind)));
  }
  Ok(id)
}
