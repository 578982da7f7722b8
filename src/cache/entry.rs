use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::ApiError;

/// Read errors are shared by every caller waiting on the same request.
pub type QueryError = Arc<ApiError>;

pub(crate) type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, QueryError>>>;

pub(crate) type Fetcher<T> =
  Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

pub(crate) struct InFlight<T> {
  pub id: u64,
  /// Entry generation when the request was issued
  pub generation: u64,
  pub future: SharedFetch<T>,
}

/// One cache partition.
pub(crate) struct Entry<T> {
  /// Cache epoch the entry was created in; `clear` starts a new one
  pub epoch: u64,
  pub data: Option<T>,
  pub error: Option<QueryError>,
  pub stale: bool,
  pub fetched_at: Option<DateTime<Utc>>,
  /// Bumped by every effective invalidation
  pub generation: u64,
  pub in_flight: Option<InFlight<T>>,
  /// Last fetcher registered for this key, used for background refetches
  pub fetcher: Option<Fetcher<T>>,
  pub subscribers: usize,
  changes: watch::Sender<u64>,
}

impl<T: Clone> Entry<T> {
  pub fn new(epoch: u64) -> Self {
    let (changes, _) = watch::channel(0);
    Self {
      epoch,
      data: None,
      error: None,
      stale: true,
      fetched_at: None,
      generation: 0,
      in_flight: None,
      fetcher: None,
      subscribers: 0,
      changes,
    }
  }

  /// Fresh means: data present, not invalidated, last fetch succeeded, and
  /// younger than `stale_time` when one is set.
  pub fn is_fresh(&self, now: DateTime<Utc>, stale_time: Option<chrono::Duration>) -> bool {
    if self.data.is_none() || self.stale || self.error.is_some() {
      return false;
    }
    match (stale_time, self.fetched_at) {
      (None, _) => true,
      (Some(stale_time), Some(fetched_at)) => now - fetched_at <= stale_time,
      (Some(_), None) => false,
    }
  }

  /// Whether invalidating would change anything.
  pub fn needs_invalidation(&self) -> bool {
    !self.stale || self.in_flight.is_some()
  }

  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.changes.subscribe()
  }

  pub fn notify(&self) {
    self.changes.send_modify(|version| *version += 1);
  }

  pub fn snapshot(&self) -> EntrySnapshot<T> {
    EntrySnapshot {
      data: self.data.clone(),
      is_stale: self.stale,
      error: self.error.as_ref().map(|e| e.to_string()),
      fetched_at: self.fetched_at,
      is_fetching: self.in_flight.is_some(),
      generation: self.generation,
    }
  }
}

/// Point-in-time view of a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot<T> {
  pub data: Option<T>,
  pub is_stale: bool,
  pub error: Option<String>,
  pub fetched_at: Option<DateTime<Utc>>,
  pub is_fetching: bool,
  pub generation: u64,
}
