// API HTTP client.
// Handles authentication, URL construction, response caching, rate limit tracking,
// and request/response processing.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{self, CacheBackend, MemcacheCache};
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};

use super::namespace::Namespace;
use super::params::Params;
use super::request::RequestSpec;
use super::types::{ClientStats, ErrorEnvelope, RateLimit};

/// Key prefix used when a backend is injected without a `[cache]` config.
pub const DEFAULT_KEY_PREFIX: &str = "chirp";

#[derive(Clone)]
struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
}

/// API client with basic authentication, optional response caching and rate
/// limit tracking.
///
/// Methods take `&mut self`, so one client serves one task at a time. Clone it
/// to get an independent handle that shares the connection pool and cache.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
    cache: Option<ResponseCache>,
    rate_limit: RateLimit,
    stats: ClientStats,
}

impl ApiClient {
    /// Create a client from `config`. A `[cache]` section enables memcached
    /// caching.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let cache = match &config.cache {
            Some(cache_config) => Some(ResponseCache {
                backend: Arc::new(MemcacheCache::new(cache_config.addresses())?),
                prefix: cache_config.key_prefix.clone(),
            }),
            None => None,
        };

        Self::build(config, cache)
    }

    /// Create a client that caches through `backend`. The key prefix comes
    /// from the config's `[cache]` section when present.
    pub fn with_cache(config: ClientConfig, backend: Arc<dyn CacheBackend>) -> Result<Self> {
        config.validate()?;

        let prefix = config
            .cache
            .as_ref()
            .map(|c| c.key_prefix.clone())
            .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());

        Self::build(config, Some(ResponseCache { backend, prefix }))
    }

    fn build(config: ClientConfig, cache: Option<ResponseCache>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ApiError::Transport)?;

        Ok(Self {
            client,
            config,
            cache,
            rate_limit: RateLimit::default(),
            stats: ClientStats::default(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the current rate limit information.
    pub fn rate_limit(&self) -> &RateLimit {
        &self.rate_limit
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    pub fn statuses(&mut self) -> Namespace<'_> {
        self.namespace("statuses")
    }

    pub fn users(&mut self) -> Namespace<'_> {
        self.namespace("users")
    }

    pub fn friends(&mut self) -> Namespace<'_> {
        self.namespace("friends")
    }

    /// Proxy for an arbitrary namespace.
    pub fn namespace(&mut self, name: &str) -> Namespace<'_> {
        Namespace::new(self, name)
    }

    /// Call `namespace/method` with the configured cache budget.
    ///
    /// An `id` parameter becomes a path segment. Returns `None` when the API
    /// sent no data.
    pub async fn invoke(
        &mut self,
        namespace: &str,
        method: &str,
        params: Params,
    ) -> Result<Option<Value>> {
        let requests_per_hour = self.config.rate()?;
        self.invoke_with_rate(namespace, method, params, requests_per_hour)
            .await
    }

    /// Like [`invoke`](Self::invoke), with a per-call cache budget.
    pub async fn invoke_with_rate(
        &mut self,
        namespace: &str,
        method: &str,
        params: Params,
        requests_per_hour: NonZeroU32,
    ) -> Result<Option<Value>> {
        let spec = RequestSpec::new(namespace, method, params)?;
        let url = spec.url(self.config.scheme(), &self.config.host)?;
        self.fetch(&spec, &url, requests_per_hour).await
    }

    /// Like [`invoke`](Self::invoke), decoding the result into `T`.
    pub async fn invoke_as<T: DeserializeOwned>(
        &mut self,
        namespace: &str,
        method: &str,
        params: Params,
    ) -> Result<Option<T>> {
        match self.invoke(namespace, method, params).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Cache key for `url` in the current time bucket, or `None` when caching
    /// is disabled.
    pub fn build_cache_key(&self, url: &str, requests_per_hour: NonZeroU32) -> Option<String> {
        self.cache
            .as_ref()
            .map(|cache| cache::build_cache_key(&cache.prefix, url, requests_per_hour))
    }

    /// Serve `url` from the cache, falling back to a live request whose
    /// result is then stored. Cache backend failures degrade to live requests.
    pub async fn fetch(
        &mut self,
        spec: &RequestSpec,
        url: &Url,
        requests_per_hour: NonZeroU32,
    ) -> Result<Option<Value>> {
        let (Some(cache), Some(key)) = (
            self.cache.clone(),
            self.build_cache_key(url.as_str(), requests_per_hour),
        ) else {
            return self.perform_request(spec, url).await;
        };

        match cache.backend.get(&key).await {
            Ok(Some(raw)) if !raw.is_empty() => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    self.stats.cache_hits += 1;
                    debug!(%key, "cache hit");
                    return Ok(Some(value));
                }
                Err(e) => warn!(%key, error = %e, "discarding undecodable cache entry"),
            },
            Ok(_) => {}
            Err(e) => warn!(%key, error = %e, "cache lookup failed"),
        }

        self.stats.cache_misses += 1;
        debug!(%key, "cache miss");

        let value = self.perform_request(spec, url).await?;

        if let Some(value) = &value {
            let raw = serde_json::to_string(value)?;
            if let Err(e) = cache.backend.set(&key, &raw).await {
                warn!(%key, error = %e, "cache store failed");
            }
        }

        Ok(value)
    }

    /// POST the request with basic auth and decode the JSON body.
    ///
    /// The form body repeats the query parameters.
    pub async fn perform_request(
        &mut self,
        spec: &RequestSpec,
        url: &Url,
    ) -> Result<Option<Value>> {
        let started = Instant::now();
        debug!(%url, "POST");

        let response = self
            .client
            .post(url.clone())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .form(spec.form())
            .send()
            .await
            .map_err(ApiError::Transport)?;

        self.stats.live_requests += 1;
        self.update_rate_limit(&response);

        let status = response.status();
        let body = response.text().await.map_err(ApiError::Transport)?;

        let elapsed = started.elapsed();
        self.stats.cumulative_request_time += elapsed;
        debug!(
            %url,
            status = status.as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            total_ms = self.stats.cumulative_request_time.as_millis() as u64,
            "response"
        );

        self.check_status(status, url, &body)?;
        decode_body(&body)
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&mut self, response: &Response) {
        let header = |name: &str| -> Option<u64> {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        };

        if let Some(limit) = header("x-ratelimit-limit") {
            self.rate_limit.limit = limit;
        }
        if let Some(remaining) = header("x-ratelimit-remaining") {
            self.rate_limit.remaining = remaining;
        }
        if let Some(reset) = header("x-ratelimit-reset") {
            self.rate_limit.reset = reset;
        }
    }

    /// Check response status and convert errors.
    fn check_status(&self, status: StatusCode, url: &Url, body: &str) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(url.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimited {
                reset_at: self.rate_limit.reset_display(),
            }),
            StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN if self.rate_limit.is_exhausted() => {
                Err(ApiError::RateLimited {
                    reset_at: self.rate_limit.reset_display(),
                })
            }
            status => {
                let envelope = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|value| ErrorEnvelope::from_value(&value));
                match envelope {
                    Some(envelope) => Err(envelope.into()),
                    None => Err(ApiError::Status {
                        status: status.as_u16(),
                        body: body.to_string(),
                    }),
                }
            }
        }
    }
}

/// Decode a response body. Empty bodies and JSON `null` mean "no data";
/// an `{"error": ...}` object is surfaced as [`ApiError::Remote`].
pub fn decode_body(body: &str) -> Result<Option<Value>> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(body)?;
    if let Some(envelope) = ErrorEnvelope::from_value(&value) {
        return Err(envelope.into());
    }

    Ok(match value {
        Value::Null => None,
        value => Some(value),
    })
}

impl From<ErrorEnvelope> for ApiError {
    fn from(envelope: ErrorEnvelope) -> Self {
        ApiError::Remote {
            message: envelope.error,
            request: envelope.request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use serde_json::json;

    #[test]
    fn test_decode_empty_body_is_none() {
        assert!(decode_body("").unwrap().is_none());
        assert!(decode_body("  \n").unwrap().is_none());
        assert!(decode_body("null").unwrap().is_none());
    }

    #[test]
    fn test_decode_json() {
        assert_eq!(decode_body(r#"{"id":42}"#).unwrap(), Some(json!({"id": 42})));
        assert_eq!(decode_body("[]").unwrap(), Some(json!([])));
    }

    #[test]
    fn test_decode_malformed_is_decode_error() {
        assert!(matches!(decode_body("<html>"), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_decode_error_envelope() {
        let err = decode_body(r#"{"request":"/statuses/show/1.json","error":"No status found"}"#)
            .unwrap_err();
        match err {
            ApiError::Remote { message, request } => {
                assert_eq!(message, "No status found");
                assert_eq!(request.as_deref(), Some("/statuses/show/1.json"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_cache_key_without_cache() {
        let client = ApiClient::new(ClientConfig::new("example.com", "u", "p")).unwrap();
        assert!(!client.has_cache());
        assert!(
            client
                .build_cache_key("http://example.com/a/b.json", cache::DEFAULT_REQUESTS_PER_HOUR)
                .is_none()
        );
    }

    #[test]
    fn test_injected_cache_uses_default_prefix() {
        let client = ApiClient::with_cache(
            ClientConfig::new("example.com", "u", "p"),
            Arc::new(MemoryCache::new()),
        )
        .unwrap();
        let key = client
            .build_cache_key("http://example.com/a/b.json", cache::DEFAULT_REQUESTS_PER_HOUR)
            .unwrap();
        assert!(key.starts_with("chirp:"));
        assert!(key.ends_with(":http://example.com/a/b.json"));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ClientConfig::new("", "u", "p");
        assert!(matches!(ApiClient::new(config), Err(ApiError::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_method_fails_before_request() {
        let mut client = ApiClient::new(ClientConfig::new("example.com", "u", "p")).unwrap();
        let err = client
            .invoke("statuses", "../admin", Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidIdentifier(_)));
        assert_eq!(client.stats().live_requests, 0);
    }
}
