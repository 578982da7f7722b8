//! Authenticated transport and the backend's resource functions.
//!
//! Resource functions are thin: one method and path each, no retry, no
//! caching. Caching lives in [`crate::cache`].

pub mod auth;
pub mod client;
pub mod comments;
pub mod posts;
pub mod types;
pub mod users;

pub use auth::{AuthMode, AuthPolicy, BearerAuth, CredentialProvider};
pub use client::{ApiClient, RequestInterceptor};
