//! Authenticated, cache-coherent access to the feedline backend.
//!
//! - [`endpoint`] picks the base address
//! - [`api`] attaches a fresh bearer credential to every request and maps the
//!   REST routes to typed functions
//! - [`cache`] keeps one shared result set per partition, de-duplicates reads
//!   and invalidates partitions after writes
//! - [`feed`] and [`session`] wire those together for post feeds

pub mod api;
pub mod cache;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod feed;
pub mod logging;
pub mod session;

pub use error::{ApiError, CredentialError};
pub use feed::PostFeed;
pub use session::Session;
