// Client configuration.
// Built in code or parsed from TOML; fixed once handed to the client.

use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Default memcached port.
pub const DEFAULT_MEMCACHE_PORT: u16 = 11211;

/// Connection and caching options for an API client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// API host without scheme, e.g. `twitter.com`.
    pub host: String,
    pub username: String,
    pub password: String,
    /// Use `https://` instead of `http://`.
    #[serde(default)]
    pub use_https: bool,
    /// Overall request timeout in milliseconds. `None` blocks until the
    /// transport gives up.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Cache budget used by `invoke` unless overridden per call.
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Response cache. Caching is disabled when absent.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

/// Memcached servers and key namespace for response caching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub servers: Vec<String>,
    #[serde(default = "default_memcache_port")]
    pub port: u16,
    pub key_prefix: String,
}

fn default_requests_per_hour() -> u32 {
    1
}

fn default_user_agent() -> String {
    concat!("chirp-api/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_memcache_port() -> u16 {
    DEFAULT_MEMCACHE_PORT
}

impl ClientConfig {
    /// Config for `host` with basic-auth credentials and no cache.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            use_https: false,
            timeout_ms: None,
            requests_per_hour: default_requests_per_hour(),
            user_agent: default_user_agent(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sub-millisecond timeouts round up to 1ms; a zero timeout fails `validate`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.timeout_ms = Some(if millis == 0 && !timeout.is_zero() { 1 } else { millis });
        self
    }

    pub fn with_https(mut self, use_https: bool) -> Self {
        self.use_https = use_https;
        self
    }

    pub fn with_requests_per_hour(mut self, requests_per_hour: u32) -> Self {
        self.requests_per_hour = requests_per_hour;
        self
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(contents)
            .map_err(|e| ApiError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_https { "https" } else { "http" }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The configured requests-per-hour budget.
    pub fn rate(&self) -> Result<NonZeroU32> {
        NonZeroU32::new(self.requests_per_hour)
            .ok_or_else(|| ApiError::Config("requests_per_hour must be at least 1".into()))
    }

    /// Validate the config values
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ApiError::Config("host must not be empty".into()));
        }
        if self.host.contains("://") {
            return Err(ApiError::Config(
                "host must not include a scheme; set use_https instead".into(),
            ));
        }
        if self.host.contains(['?', '#']) {
            return Err(ApiError::Config(
                "host must not include a query or fragment".into(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(ApiError::Config("timeout_ms must be at least 1".into()));
        }
        self.rate()?;

        if let Some(cache) = &self.cache {
            if cache.servers.is_empty() {
                return Err(ApiError::Config(
                    "cache.servers must list at least one server".into(),
                ));
            }
            if cache.key_prefix.is_empty() {
                return Err(ApiError::Config("cache.key_prefix must not be empty".into()));
            }
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn new(servers: Vec<String>, port: u16, key_prefix: impl Into<String>) -> Self {
        Self {
            servers,
            port,
            key_prefix: key_prefix.into(),
        }
    }

    /// `host:port` for every configured server.
    pub fn addresses(&self) -> Vec<String> {
        self.servers
            .iter()
            .map(|server| format!("{}:{}", server, self.port))
            .collect()
    }
}
