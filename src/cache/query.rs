//! Subscribed readers of a cache partition.
//!
//! Inspired by TanStack Query's `useQuery`: a `Query<T>` exposes the loading,
//! success and error state of one partition and keeps the partition "watched"
//! so invalidations refetch it in the background.
//!
//! # Example
//!
//! ```ignore
//! let feed = session.feed(None);
//! let mut query = feed.watch();
//! query.fetch();
//!
//! while query.changed().await {
//!     match query.state() {
//!         QueryState::Success(posts) => println!("{} posts", posts.len()),
//!         QueryState::Error(e) => eprintln!("feed unavailable: {}", e),
//!         QueryState::Loading | QueryState::Idle => {}
//!     }
//! }
//! ```

use tokio::sync::watch;

use super::client::QueryClient;
use super::entry::QueryError;
use super::key::QueryKey;

/// What a reader of one partition can show right now.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// The partition has never been fetched and no request is out
  Idle,
  /// The first request for the partition is out
  Loading,
  /// Last payload; a background refresh after invalidation keeps this state
  Success(T),
  /// The latest request failed and no retry is out. The last payload, if
  /// any, is still available from [`Query::data`]
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// A live subscription to one partition.
///
/// Dropping it releases interest in the partition. A request already in
/// flight keeps running for any other reader that needs it.
pub struct Query<T>
where
  T: Clone + Send + Sync + 'static,
{
  client: QueryClient<T>,
  key: QueryKey,
  changes: watch::Receiver<u64>,
  /// Cache epoch the subscription was counted in
  epoch: u64,
}

impl<T> Query<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub(crate) fn new(
    client: QueryClient<T>,
    key: QueryKey,
    changes: watch::Receiver<u64>,
    epoch: u64,
  ) -> Self {
    Self {
      client,
      key,
      changes,
      epoch,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Current state of the partition.
  pub fn state(&self) -> QueryState<T> {
    let Some(snapshot) = self.client.snapshot(&self.key) else {
      return QueryState::Idle;
    };

    match (snapshot.data, snapshot.error) {
      (_, Some(error)) if !snapshot.is_fetching => QueryState::Error(error),
      (Some(data), _) => QueryState::Success(data),
      (None, _) if snapshot.is_fetching => QueryState::Loading,
      (None, _) => QueryState::Idle,
    }
  }

  /// Last fetched data, even if stale.
  pub fn data(&self) -> Option<T> {
    self.client.get_data(&self.key)
  }

  /// True while the first fetch is in flight.
  pub fn is_loading(&self) -> bool {
    self.state().is_loading()
  }

  /// True while any fetch is in flight, including background refetches.
  pub fn is_fetching(&self) -> bool {
    self
      .client
      .snapshot(&self.key)
      .is_some_and(|s| s.is_fetching)
  }

  pub fn is_stale(&self) -> bool {
    self.client.snapshot(&self.key).map_or(true, |s| s.is_stale)
  }

  pub fn error(&self) -> Option<String> {
    self.client.snapshot(&self.key).and_then(|s| s.error)
  }

  /// Start fetching in the background if the partition is not fresh.
  ///
  /// Joins an in-flight request instead of starting a second one.
  pub fn fetch(&self) {
    let client = self.client.clone();
    let key = self.key.clone();
    tokio::spawn(async move {
      let _ = client.run(&key, None, false).await;
    });
  }

  /// Force a background refetch, even if the data is fresh.
  pub fn refetch(&self) {
    let client = self.client.clone();
    let key = self.key.clone();
    tokio::spawn(async move {
      let _ = client.run(&key, None, true).await;
    });
  }

  /// Fetch if needed and wait for the result.
  pub async fn load(&self) -> Result<T, QueryError> {
    self.client.run(&self.key, None, false).await.map(|r| r.data)
  }

  /// Refetch and wait for the result.
  pub async fn reload(&self) -> Result<T, QueryError> {
    self.client.refetch(&self.key).await
  }

  /// Returns `true` if the partition changed since the last poll, for
  /// callers that check periodically instead of awaiting [`changed`](Self::changed).
  pub fn poll(&mut self) -> bool {
    match self.changes.has_changed() {
      Ok(true) => {
        self.changes.borrow_and_update();
        true
      }
      _ => false,
    }
  }

  /// Wait until the partition changes. Returns `false` once the cache has
  /// been cleared since this query was created.
  pub async fn changed(&mut self) -> bool {
    self.changes.changed().await.is_ok()
  }
}

impl<T> Drop for Query<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn drop(&mut self) {
    self.client.unsubscribe(&self.key, self.epoch);
  }
}

impl<T> std::fmt::Debug for Query<T>
where
  T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ApiError;
  use reqwest::StatusCode;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::sync::Notify;

  fn counter_query(
    client: &QueryClient<usize>,
    key: QueryKey,
    calls: &Arc<AtomicUsize>,
  ) -> Query<usize> {
    let calls = calls.clone();
    client.watch(key, move || {
      let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
      async move { Ok::<_, ApiError>(n) }
    })
  }

  async fn settle(query: &Query<usize>) {
    for _ in 0..1000 {
      if !query.is_fetching() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("query for {} never settled", query.key());
  }

  #[tokio::test]
  async fn test_query_success() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = counter_query(&client, QueryKey::Posts, &calls);

    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.changed().await);
    settle(&query).await;

    assert!(query.state().is_success());
    assert_eq!(query.data(), Some(1));
    assert!(!query.is_stale());
  }

  #[tokio::test]
  async fn test_query_loading_then_error() {
    let client: QueryClient<usize> = QueryClient::new();
    let gate = Arc::new(Notify::new());
    let query = client.watch(QueryKey::Posts, {
      let gate = gate.clone();
      move || {
        let gate = gate.clone();
        async move {
          gate.notified().await;
          Err::<usize, _>(ApiError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            url: "http://localhost:5001/api/posts".to_string(),
            message: "Something went wrong".to_string(),
          })
        }
      }
    });

    query.fetch();
    while !query.is_fetching() {
      tokio::task::yield_now().await;
    }
    assert!(query.is_loading());

    gate.notify_one();
    settle(&query).await;
    assert!(query.state().is_error());
    assert!(query.error().unwrap().contains("Something went wrong"));
  }

  #[tokio::test]
  async fn test_subscribed_partition_refetches_on_invalidation() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = counter_query(&client, QueryKey::Posts, &calls);

    assert_eq!(query.load().await.unwrap(), 1);
    query.poll();

    client.invalidate(&QueryKey::Posts);
    assert!(query.poll());
    settle(&query).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(query.data(), Some(2));
    assert!(!query.is_stale());
  }

  #[tokio::test]
  async fn test_dropped_query_releases_interest() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let query = counter_query(&client, QueryKey::Posts, &calls);
    query.load().await.unwrap();
    drop(query);

    client.invalidate(&QueryKey::Posts);
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(client.snapshot(&QueryKey::Posts).unwrap().is_stale);
  }

  #[tokio::test]
  async fn test_dropping_one_reader_keeps_fetch_for_others() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    let fetcher = {
      let calls = calls.clone();
      let gate = gate.clone();
      move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = gate.clone();
        async move {
          gate.notified().await;
          Ok::<_, ApiError>(n)
        }
      }
    };

    // The gated fetcher is registered last, so refetches use it.
    let second = counter_query(&client, QueryKey::Posts, &calls);
    let first = client.watch(QueryKey::Posts, fetcher);

    let abandoned = tokio::spawn({
      let client = client.clone();
      async move { client.refetch(&QueryKey::Posts).await }
    });
    while !second.is_fetching() {
      tokio::task::yield_now().await;
    }
    abandoned.abort();
    drop(first);

    gate.notify_one();
    assert_eq!(second.load().await.unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidation_mid_fetch_refetches_subscribed_partition() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    let query = client.watch(QueryKey::Posts, {
      let calls = calls.clone();
      let gate = gate.clone();
      move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = gate.clone();
        async move {
          if n == 1 {
            gate.notified().await;
          }
          Ok::<_, ApiError>(n)
        }
      }
    });

    query.fetch();
    while !query.is_fetching() {
      tokio::task::yield_now().await;
    }
    // A write lands while the first request is out.
    assert!(client.invalidate(&QueryKey::Posts));
    gate.notify_one();

    for _ in 0..1000 {
      if calls.load(Ordering::SeqCst) == 2 && !query.is_fetching() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(query.data(), Some(2));
    assert!(!query.is_stale());
  }

  #[tokio::test]
  async fn test_query_from_before_clear_keeps_new_subscriber() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut signed_out = counter_query(&client, QueryKey::Posts, &calls);

    client.clear();
    let live = counter_query(&client, QueryKey::Posts, &calls);
    assert_eq!(live.load().await.unwrap(), 1);

    assert!(!signed_out.changed().await);
    drop(signed_out);

    client.invalidate(&QueryKey::Posts);
    settle(&live).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(live.data(), Some(2));
    assert!(!live.is_stale());
  }

  #[tokio::test]
  async fn test_poll_reports_changes_once() {
    let client = QueryClient::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut query = counter_query(&client, QueryKey::user_posts("alice"), &calls);

    assert!(!query.poll());
    query.load().await.unwrap();
    assert!(query.poll());
    assert!(!query.poll());
  }
}
