use super::client::ApiClient;
use super::types::{Ack, UpdateProfileRequest, UserResponse};
use crate::error::{ApiError, Result};

/// `POST /users/sync`: create or refresh the backend record for the signed-in user.
pub async fn sync_user(api: &ApiClient) -> Result<Ack> {
  api.post(&["users", "sync"]).await
}

/// `GET /users/me`
pub async fn current_user(api: &ApiClient) -> Result<UserResponse> {
  api.get(&["users", "me"]).await
}

/// `PUT /users/profile`
pub async fn update_profile(api: &ApiClient, request: &UpdateProfileRequest) -> Result<UserResponse> {
  if request.is_empty() {
    return Err(ApiError::InvalidRequest(
      "profile update has no fields".to_string(),
    ));
  }
  api.put_json(&["users", "profile"], request).await
}
