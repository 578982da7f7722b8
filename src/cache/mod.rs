//! Keyed, shared client-side cache for server-owned data.
//!
//! This module provides a TanStack Query style cache that:
//! - Stores one result set per [`QueryKey`] partition
//! - De-duplicates concurrent reads of the same partition into one request
//! - Marks partitions stale when a [`Mutation`] succeeds and refetches the
//!   ones that have live [`Query`] subscribers
//! - Never trusts a fetch that started before the latest invalidation

mod client;
mod entry;
mod key;
mod mutation;
mod query;
mod result;

pub use client::QueryClient;
pub use entry::{EntrySnapshot, QueryError};
pub use key::QueryKey;
pub use mutation::Mutation;
pub use query::{Query, QueryState};
pub use result::{CacheResult, CacheSource};
