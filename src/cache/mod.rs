// Cache module for API responses.
// Raw JSON bodies are stored under time-bucketed keys in a pluggable key-value backend.

pub mod key;
pub mod memcache;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use key::{DEFAULT_REQUESTS_PER_HOUR, build_cache_key, cache_key_at, time_bucket};
pub use memcache::MemcacheCache;
pub use memory::MemoryCache;

/// Key-value store holding serialized JSON responses.
///
/// Implementations need no locking around read-then-write: concurrent misses
/// on the same key store identical values.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Look up a key. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
