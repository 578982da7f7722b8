//! Cached post feeds and the writes that keep them coherent.
//!
//! A feed is either the global list (`Posts`) or one user's posts
//! (`UserPosts(username)`). Every write issued through a feed invalidates the
//! global list, plus the user's partition when the feed is user-scoped.

use futures::future::{BoxFuture, FutureExt};

use crate::api::client::ApiClient;
use crate::api::types::{Ack, CreatePostRequest, Post, User};
use crate::api::{comments, posts};
use crate::cache::{Mutation, Query, QueryClient, QueryError, QueryKey};
use crate::error::ApiError;
use crate::session::Session;

/// Partitions a post write makes stale.
pub fn feed_invalidation(username: Option<&str>) -> Vec<QueryKey> {
  let mut keys = vec![QueryKey::Posts];
  if let Some(username) = username {
    keys.push(QueryKey::user_posts(username));
  }
  keys
}

/// Whether `viewer` is among the users who liked a post.
pub fn is_liked_by(likes: &[String], viewer: Option<&User>) -> bool {
  viewer.is_some_and(|viewer| likes.iter().any(|id| *id == viewer.id))
}

type PostMutation<A> = Mutation<A, Ack, Vec<Post>>;

#[derive(Clone)]
pub struct PostFeed {
  api: ApiClient,
  cache: QueryClient<Vec<Post>>,
  username: Option<String>,
  like: PostMutation<String>,
  delete: PostMutation<String>,
  create: PostMutation<CreatePostRequest>,
  comment: PostMutation<(String, String)>,
}

impl PostFeed {
  /// A blank username means the global feed.
  pub fn new(session: &Session, username: Option<String>) -> Self {
    let api = session.api().clone();
    let cache = session.cache().clone();
    let username = username.filter(|u| !u.trim().is_empty());

    let like = {
      let api = api.clone();
      mutation(&cache, username.as_deref(), move |post_id: String| {
        let api = api.clone();
        async move { posts::like_post(&api, &post_id).await }
      })
    };
    let delete = {
      let api = api.clone();
      mutation(&cache, username.as_deref(), move |post_id: String| {
        let api = api.clone();
        async move { posts::delete_post(&api, &post_id).await }
      })
    };
    let create = {
      let api = api.clone();
      mutation(&cache, username.as_deref(), move |request: CreatePostRequest| {
        let api = api.clone();
        async move { posts::create_post(&api, &request).await }
      })
    };
    let comment = {
      let api = api.clone();
      mutation(
        &cache,
        username.as_deref(),
        move |(post_id, content): (String, String)| {
          let api = api.clone();
          async move { comments::create_comment(&api, &post_id, &content).await }
        },
      )
    };

    Self {
      api,
      cache,
      username,
      like,
      delete,
      create,
      comment,
    }
  }

  pub fn key(&self) -> QueryKey {
    match &self.username {
      Some(username) => QueryKey::user_posts(username.as_str()),
      None => QueryKey::Posts,
    }
  }

  pub fn username(&self) -> Option<&str> {
    self.username.as_deref()
  }

  /// Read the feed, from cache when fresh.
  pub async fn posts(&self) -> Result<Vec<Post>, QueryError> {
    self.cache.fetch(self.key(), self.fetcher()).await
  }

  /// Subscribe to the feed so writes refresh it in the background.
  pub fn watch(&self) -> Query<Vec<Post>> {
    self.cache.watch(self.key(), self.fetcher())
  }

  /// Fetch the feed from the server regardless of freshness.
  pub async fn refetch(&self) -> Result<Vec<Post>, QueryError> {
    let key = self.key();
    self.cache.invalidate(&key);
    self.cache.fetch(key, self.fetcher()).await
  }

  /// Like or unlike; the server decides which based on the caller.
  pub async fn toggle_like(&self, post_id: &str) -> Result<Ack, ApiError> {
    self.like.mutate(post_id.to_string()).await
  }

  pub async fn delete_post(&self, post_id: &str) -> Result<Ack, ApiError> {
    self.delete.mutate(post_id.to_string()).await
  }

  pub async fn create_post(&self, request: CreatePostRequest) -> Result<Ack, ApiError> {
    self.create.mutate(request).await
  }

  pub async fn add_comment(&self, post_id: &str, content: &str) -> Result<Ack, ApiError> {
    self
      .comment
      .mutate((post_id.to_string(), content.to_string()))
      .await
  }

  /// True while any write issued through this feed is running.
  pub fn is_mutating(&self) -> bool {
    self.like.is_pending()
      || self.delete.is_pending()
      || self.create.is_pending()
      || self.comment.is_pending()
  }

  fn fetcher(
    &self,
  ) -> impl Fn() -> BoxFuture<'static, Result<Vec<Post>, ApiError>> + Send + Sync + 'static {
    let api = self.api.clone();
    let username = self.username.clone();
    move || {
      let api = api.clone();
      let username = username.clone();
      async move {
        let response = match username {
          Some(username) => posts::list_user_posts(&api, &username).await?,
          None => posts::list_posts(&api).await?,
        };
        Ok(response.posts)
      }
      .boxed()
    }
  }
}

impl std::fmt::Debug for PostFeed {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PostFeed")
      .field("key", &self.key())
      .finish_non_exhaustive()
  }
}

fn mutation<A, F, Fut>(
  cache: &QueryClient<Vec<Post>>,
  username: Option<&str>,
  mutation_fn: F,
) -> PostMutation<A>
where
  A: Send + 'static,
  F: Fn(A) -> Fut + Send + Sync + 'static,
  Fut: std::future::Future<Output = Result<Ack, ApiError>> + Send + 'static,
{
  let keys = feed_invalidation(username);
  Mutation::new(cache.clone(), mutation_fn, move |_: &A| keys.clone())
}
