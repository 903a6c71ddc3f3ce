//! Client library for a Twitter v1 style REST API.
//!
//! Every endpoint reduces to `namespace/method[/id].json`: the client builds
//! the URL, POSTs it with basic auth, and decodes the JSON body. Responses
//! can be cached in a [`CacheBackend`] under keys that rotate once per
//! `3600 / requests_per_hour` seconds.
//!
//! ```no_run
//! use chirp_api::{ApiClient, ClientConfig, Params};
//!
//! # async fn run() -> chirp_api::Result<()> {
//! let config = ClientConfig::new("twitter.com", "user", "secret");
//! let mut api = ApiClient::new(config)?;
//! let followers = api.statuses().followers(Params::new().with("page", 1)).await?;
//! println!("{followers:?}");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;

pub use api::{ApiClient, ClientStats, Namespace, Params, RateLimit, RequestSpec};
pub use cache::{CacheBackend, MemcacheCache, MemoryCache};
pub use config::{CacheConfig, ClientConfig};
pub use error::{ApiError, Result};
