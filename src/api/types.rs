// API support types.
// Rate limit state, client statistics, and the JSON error envelope.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rate limit information from `X-RateLimit-*` response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp when the window resets.
    pub reset: u64,
}

impl RateLimit {
    /// True once the server has reported a limit and it is used up.
    pub fn is_exhausted(&self) -> bool {
        self.limit > 0 && self.remaining == 0
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.reset as i64, 0)
    }

    /// Reset time as `HH:MM:SS`, or "unknown".
    pub fn reset_display(&self) -> String {
        self.reset_at()
            .map(|dt| dt.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Counters accumulated over the lifetime of a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Requests sent over the wire.
    pub live_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Total time spent in live requests.
    pub cumulative_request_time: Duration,
}

/// Error body returned by the API, e.g.
/// `{"request": "/statuses/show/1.json", "error": "Not found"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default)]
    pub request: Option<String>,
}

impl ErrorEnvelope {
    /// Extract an envelope from a decoded body, if it is one. Only `error`
    /// has to be a string; a non-string `request` is dropped.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let error = value.get("error")?.as_str()?;
        let request = value
            .get("request")
            .and_then(|r| r.as_str())
            .map(str::to_string);

        Some(Self {
            error: error.to_string(),
            request,
        })
    }
}
