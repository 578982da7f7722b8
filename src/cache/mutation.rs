//! Writes that invalidate cache partitions when they succeed.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::client::QueryClient;
use super::key::QueryKey;
use crate::error::ApiError;

type MutationFn<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<R, ApiError>> + Send + Sync>;
type InvalidationRule<A> = Arc<dyn Fn(&A) -> Vec<QueryKey> + Send + Sync>;

/// A server write bound to the partitions it can make stale.
///
/// On success every key produced by the invalidation rule is invalidated.
/// On failure nothing in the cache changes and the error goes back to the
/// caller.
pub struct Mutation<A, R, T> {
  client: QueryClient<T>,
  mutation_fn: MutationFn<A, R>,
  invalidates: InvalidationRule<A>,
  pending: Arc<AtomicUsize>,
}

impl<A, R, T> Mutation<A, R, T>
where
  A: Send + 'static,
  R: Send + 'static,
  T: Clone + Send + Sync + 'static,
{
  /// `invalidates` maps the mutation's arguments (and whatever context the
  /// closure captures, such as the acting user) to the keys to mark stale.
  pub fn new<F, Fut, I>(client: QueryClient<T>, mutation_fn: F, invalidates: I) -> Self
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    I: Fn(&A) -> Vec<QueryKey> + Send + Sync + 'static,
  {
    Self {
      client,
      mutation_fn: Arc::new(move |args| mutation_fn(args).boxed()),
      invalidates: Arc::new(invalidates),
      pending: Arc::new(AtomicUsize::new(0)),
    }
  }

  /// Run the mutation and apply its invalidations on success.
  pub async fn mutate(&self, args: A) -> Result<R, ApiError> {
    let keys = (self.invalidates)(&args);
    let _pending = PendingGuard::new(&self.pending);

    match (self.mutation_fn)(args).await {
      Ok(result) => {
        let changed = self.client.invalidate_many(&keys);
        info!(
          keys = ?keys,
          changed,
          "mutation succeeded, partitions invalidated"
        );
        Ok(result)
      }
      Err(e) => {
        warn!(error = %e, "mutation failed, cache left untouched");
        Err(e)
      }
    }
  }

  /// Fire-and-forget variant of [`mutate`](Self::mutate).
  pub fn spawn(&self, args: A) -> JoinHandle<Result<R, ApiError>> {
    let this = self.clone();
    tokio::spawn(async move { this.mutate(args).await })
  }

  /// True while at least one call is running.
  pub fn is_pending(&self) -> bool {
    self.pending.load(Ordering::SeqCst) > 0
  }
}

impl<A, R, T> Clone for Mutation<A, R, T> {
  fn clone(&self) -> Self {
    Self {
      client: self.client.clone(),
      mutation_fn: Arc::clone(&self.mutation_fn),
      invalidates: Arc::clone(&self.invalidates),
      pending: Arc::clone(&self.pending),
    }
  }
}

/// Counts a running call; released on completion or cancellation.
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
  fn new(counter: &'a AtomicUsize) -> Self {
    counter.fetch_add(1, Ordering::SeqCst);
    Self(counter)
  }
}

impl Drop for PendingGuard<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}
