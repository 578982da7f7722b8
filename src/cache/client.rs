//! Query client that orchestrates cache partitions with network fetching.

use chrono::Utc;
use futures::future::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

use super::entry::{Entry, EntrySnapshot, Fetcher, InFlight, QueryError, SharedFetch};
use super::key::QueryKey;
use super::query::Query;
use super::result::CacheResult;
use crate::error::ApiError;

/// Shared cache of query results, one partition per [`QueryKey`].
///
/// Create one per session and clone it to every caller; clones share state.
/// All partition state transitions happen under one lock that is never held
/// across an `.await`.
pub struct QueryClient<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  entries: Mutex<HashMap<QueryKey, Entry<T>>>,
  /// How long fetched data is trusted; `None` means until invalidated
  stale_time: Option<chrono::Duration>,
  next_fetch_id: AtomicU64,
  /// Bumped by `clear`; requests and subscriptions from an older epoch no
  /// longer touch the map
  epoch: AtomicU64,
}

/// What a read should do, decided under the lock.
enum Step<T> {
  Fresh(CacheResult<T>),
  Start(SharedFetch<T>),
  Join {
    future: SharedFetch<T>,
    /// False when the request was issued before the latest invalidation
    current: bool,
  },
  NoFetcher,
}

impl<T> QueryClient<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self::with_stale_time(None)
  }

  /// Create a client whose data goes stale on its own after `stale_time`,
  /// in addition to explicit invalidation.
  pub fn with_stale_time(stale_time: Option<chrono::Duration>) -> Self {
    Self {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        stale_time,
        next_fetch_id: AtomicU64::new(1),
        epoch: AtomicU64::new(0),
      }),
    }
  }

  pub fn stale_time(&self) -> Option<chrono::Duration> {
    self.inner.stale_time
  }

  /// Read a partition.
  ///
  /// 1. Fresh data is returned without a request
  /// 2. A request already in flight for `key` is joined
  /// 3. Otherwise `fetcher` is called and its result stored
  ///
  /// `fetcher` is remembered for background refetches of this key.
  pub async fn fetch<F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<T, QueryError>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    self.fetch_result(key, fetcher).await.map(|r| r.data)
  }

  /// Same as [`fetch`](Self::fetch), also reporting where the data came from.
  pub async fn fetch_result<F, Fut>(
    &self,
    key: QueryKey,
    fetcher: F,
  ) -> Result<CacheResult<T>, QueryError>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    self.run(&key, Some(boxed_fetcher(fetcher)), false).await
  }

  /// Fetch `key` again with its registered fetcher, even if fresh. Still
  /// joins a current in-flight request instead of issuing a second one.
  pub async fn refetch(&self, key: &QueryKey) -> Result<T, QueryError> {
    self.run(key, None, true).await.map(|r| r.data)
  }

  /// Subscribe to a partition. While the returned [`Query`] is alive,
  /// invalidating `key` refetches it in the background.
  pub fn watch<F, Fut>(&self, key: QueryKey, fetcher: F) -> Query<T>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let (changes, epoch) = {
      let mut entries = self.inner.lock();
      let entry = self.inner.entry(&mut entries, key.clone());
      entry.fetcher = Some(boxed_fetcher(fetcher));
      entry.subscribers += 1;
      (entry.subscribe(), entry.epoch)
    };
    Query::new(self.clone(), key, changes, epoch)
  }

  /// Mark one partition stale. Returns whether anything changed.
  pub fn invalidate(&self, key: &QueryKey) -> bool {
    self.invalidate_many(std::iter::once(key)) > 0
  }

  /// Mark partitions stale and refetch the subscribed ones.
  ///
  /// Absent partitions are skipped. A stale partition with nothing in flight
  /// is left as is, so repeating an invalidation is a no-op. A partition with
  /// a request in flight always moves to a new generation, so that request
  /// cannot mark it fresh when it lands. Returns how many partitions changed.
  pub fn invalidate_many<'a>(&self, keys: impl IntoIterator<Item = &'a QueryKey>) -> usize {
    let mut changed = 0;
    let mut refetches = Vec::new();

    {
      let mut entries = self.inner.lock();
      for key in keys {
        let Some(entry) = entries.get_mut(key) else {
          continue;
        };
        if !entry.needs_invalidation() {
          continue;
        }

        entry.stale = true;
        entry.generation += 1;
        entry.notify();
        changed += 1;
        debug!(key = %key, generation = entry.generation, "invalidated");

        // With a request in flight, its completion schedules the refetch.
        if entry.subscribers > 0 && entry.in_flight.is_none() {
          if let Some(fetcher) = entry.fetcher.clone() {
            refetches.push((key.clone(), self.inner.start_fetch(key, entry, &fetcher)));
          }
        }
      }
    }

    for (key, future) in refetches {
      spawn_refetch(&key, future);
    }
    changed
  }

  pub fn snapshot(&self, key: &QueryKey) -> Option<EntrySnapshot<T>> {
    self.inner.lock().get(key).map(Entry::snapshot)
  }

  /// Cached data for `key`, whether fresh or not.
  pub fn get_data(&self, key: &QueryKey) -> Option<T> {
    self.inner.lock().get(key).and_then(|e| e.data.clone())
  }

  pub fn keys(&self) -> Vec<QueryKey> {
    self.inner.lock().keys().cloned().collect()
  }

  /// Drop every partition, e.g. on sign-out. Requests still in flight finish
  /// without recording anything.
  ///
  /// Queries created before the clear stop counting as subscribers and their
  /// change streams end.
  pub fn clear(&self) {
    let (dropped, epoch) = {
      let mut entries = self.inner.lock();
      let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
      let count = entries.len();
      entries.clear();
      (count, epoch)
    };
    debug!(dropped, epoch, "cache cleared");
  }

  pub(crate) fn unsubscribe(&self, key: &QueryKey, epoch: u64) {
    if let Some(entry) = self.inner.lock().get_mut(key) {
      if entry.epoch == epoch {
        entry.subscribers = entry.subscribers.saturating_sub(1);
      }
    }
  }

  pub(crate) async fn run(
    &self,
    key: &QueryKey,
    fetcher: Option<Fetcher<T>>,
    mut force: bool,
  ) -> Result<CacheResult<T>, QueryError> {
    loop {
      match self.plan(key, fetcher.as_ref(), force) {
        Step::Fresh(result) => {
          debug!(key = %key, "cache hit");
          return Ok(result);
        }
        Step::Start(future) => {
          debug!(key = %key, "fetching");
          return future.await.map(CacheResult::from_network);
        }
        Step::Join {
          future,
          current: true,
        } => {
          debug!(key = %key, "joining in-flight request");
          return future.await.map(CacheResult::shared);
        }
        Step::Join {
          future,
          current: false,
        } => {
          // Issued before the latest invalidation; wait for it to land, then
          // decide again.
          debug!(key = %key, "in-flight request is outdated, waiting");
          let _ = future.await;
          force = false;
        }
        Step::NoFetcher => {
          return Err(Arc::new(ApiError::InvalidRequest(format!(
            "no fetcher registered for {}",
            key
          ))));
        }
      }
    }
  }

  fn plan(&self, key: &QueryKey, fetcher: Option<&Fetcher<T>>, force: bool) -> Step<T> {
    let mut entries = self.inner.lock();
    let entry = self.inner.entry(&mut entries, key.clone());

    if let Some(fetcher) = fetcher {
      entry.fetcher = Some(fetcher.clone());
    }

    if !force && entry.is_fresh(Utc::now(), self.inner.stale_time) {
      if let Some(data) = &entry.data {
        return Step::Fresh(CacheResult::from_cache(data.clone(), entry.fetched_at));
      }
    }

    if let Some(in_flight) = &entry.in_flight {
      return Step::Join {
        future: in_flight.future.clone(),
        current: in_flight.generation == entry.generation,
      };
    }

    match entry.fetcher.clone() {
      Some(fetcher) => Step::Start(self.inner.start_fetch(key, entry, &fetcher)),
      None => Step::NoFetcher,
    }
  }
}

impl<T> Inner<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry<T>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Entry for `key`, created in the current epoch if absent. Call with the
  /// lock held so `clear` cannot interleave.
  fn entry<'a>(
    &self,
    entries: &'a mut HashMap<QueryKey, Entry<T>>,
    key: QueryKey,
  ) -> &'a mut Entry<T> {
    let epoch = self.epoch.load(Ordering::SeqCst);
    entries.entry(key).or_insert_with(|| Entry::new(epoch))
  }

  /// Create the shared request for `entry` and record it as in flight.
  ///
  /// The request is lazy: nothing runs until someone polls it. Whoever polls
  /// it to completion records the result exactly once.
  fn start_fetch(
    self: &Arc<Self>,
    key: &QueryKey,
    entry: &mut Entry<T>,
    fetcher: &Fetcher<T>,
  ) -> SharedFetch<T> {
    let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
    let epoch = entry.epoch;
    let generation = entry.generation;
    let request = fetcher();
    let inner: Weak<Self> = Arc::downgrade(self);
    let key = key.clone();

    let future = async move {
      let result = request.await.map_err(Arc::new);
      if let Some(inner) = inner.upgrade() {
        inner.complete(&key, id, epoch, generation, &result);
      }
      result
    }
    .boxed()
    .shared();

    entry.in_flight = Some(InFlight {
      id,
      generation,
      future: future.clone(),
    });
    entry.notify();
    future
  }

  fn complete(
    self: &Arc<Self>,
    key: &QueryKey,
    id: u64,
    epoch: u64,
    generation: u64,
    result: &Result<T, QueryError>,
  ) {
    let follow_up = {
      let mut entries = self.lock();
      let Some(entry) = entries.get_mut(key) else {
        return;
      };
      if entry.epoch != epoch {
        debug!(key = %key, "result from before the cache was cleared, dropped");
        return;
      }

      if entry.in_flight.as_ref().is_some_and(|f| f.id == id) {
        entry.in_flight = None;
      }

      // Last completed wins for the payload; freshness needs the generation
      // to be unchanged since the request was issued.
      let outdated = generation != entry.generation;
      match result {
        Ok(data) => {
          entry.data = Some(data.clone());
          entry.error = None;
          entry.fetched_at = Some(Utc::now());
          entry.stale = outdated;
          debug!(key = %key, outdated, "fetch completed");
        }
        Err(e) => {
          entry.error = Some(e.clone());
          entry.stale = true;
          debug!(key = %key, error = %e, "fetch failed");
        }
      }
      entry.notify();

      if outdated && entry.subscribers > 0 && entry.in_flight.is_none() {
        entry
          .fetcher
          .clone()
          .map(|fetcher| self.start_fetch(key, entry, &fetcher))
      } else {
        None
      }
    };

    if let Some(future) = follow_up {
      spawn_refetch(key, future);
    }
  }
}

impl<T> Clone for QueryClient<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T> Default for QueryClient<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<T> std::fmt::Debug for QueryClient<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryClient")
      .field("stale_time", &self.inner.stale_time)
      .finish_non_exhaustive()
  }
}

fn boxed_fetcher<T, F, Fut>(fetcher: F) -> Fetcher<T>
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
  Arc::new(move || fetcher().boxed())
}

/// Drive a background refetch on the current runtime. Without one, the
/// request stays registered and the next reader drives it.
fn spawn_refetch<T>(key: &QueryKey, future: SharedFetch<T>)
where
  T: Clone + Send + Sync + 'static,
{
  match tokio::runtime::Handle::try_current() {
    Ok(handle) => {
      handle.spawn(async move {
        let _ = future.await;
      });
    }
    Err(_) => debug!(key = %key, "no runtime, refetch deferred to next read"),
  }
}
