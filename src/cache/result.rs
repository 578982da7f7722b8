use chrono::{DateTime, Utc};

/// Result from a cache read, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the cached data was fetched (cache hits only)
  pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Data from a request this caller started.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      fetched_at: None,
    }
  }

  /// Data from a request another caller had already started.
  pub fn shared(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Shared,
      fetched_at: None,
    }
  }

  pub fn from_cache(data: T, fetched_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      fetched_at,
    }
  }
}

/// Indicates where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// This read dispatched the request
  Network,
  /// Joined an in-flight request for the same partition
  Shared,
  /// Fresh cached data, no request
  Cache,
}
