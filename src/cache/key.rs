// Time-bucketed cache keys.
// A key embeds floor(now * requests_per_hour / 3600), so it rotates once per
// bucket and stale entries are simply never looked up again.

use std::num::NonZeroU32;

use chrono::Utc;

/// Seconds per bucket budget window.
const SECONDS_PER_HOUR: i64 = 3600;

/// Default budget: one live request per URL per hour.
pub const DEFAULT_REQUESTS_PER_HOUR: NonZeroU32 = NonZeroU32::MIN;

/// Bucket index for a Unix timestamp.
pub fn time_bucket(epoch_secs: i64, requests_per_hour: NonZeroU32) -> i64 {
    (epoch_secs * i64::from(requests_per_hour.get())).div_euclid(SECONDS_PER_HOUR)
}

/// Format `prefix:bucket:url`.
pub fn cache_key(prefix: &str, bucket: i64, url: &str) -> String {
    format!("{}:{}:{}", prefix, bucket, url)
}

/// Key for `url` at an explicit time.
pub fn cache_key_at(
    prefix: &str,
    url: &str,
    requests_per_hour: NonZeroU32,
    epoch_secs: i64,
) -> String {
    cache_key(prefix, time_bucket(epoch_secs, requests_per_hour), url)
}

/// Key for `url` at the current time.
pub fn build_cache_key(prefix: &str, url: &str, requests_per_hour: NonZeroU32) -> String {
    cache_key_at(prefix, url, requests_per_hour, Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://twitter.com/statuses/followers.json?page=1";

    fn rph(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn test_key_format() {
        assert_eq!(
            cache_key_at("twitter", URL, DEFAULT_REQUESTS_PER_HOUR, 7200),
            format!("twitter:2:{}", URL)
        );
    }

    #[test]
    fn test_key_deterministic_within_bucket() {
        let a = cache_key_at("twitter", URL, rph(1), 1_700_000_000);
        let b = cache_key_at("twitter", URL, rph(1), 1_700_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_changes_only_at_bucket_boundary() {
        // 4 requests per hour: 900 second buckets.
        let r = rph(4);
        assert_eq!(time_bucket(900, r), 1);
        assert_eq!(time_bucket(1799, r), 1);
        assert_eq!(time_bucket(1800, r), 2);

        let start = 1_699_999_200; // multiple of 900
        let first = cache_key_at("p", URL, r, start);
        assert_eq!(first, cache_key_at("p", URL, r, start + 899));
        assert_ne!(first, cache_key_at("p", URL, r, start + 900));
    }

    #[test]
    fn test_bucket_matches_float_formula() {
        for (t, r) in [(1_700_000_123_i64, 1_u32), (1_700_000_123, 7), (59, 3600), (3601, 13)] {
            let expected = ((t as f64) * (r as f64) / 3600.0).floor() as i64;
            assert_eq!(time_bucket(t, rph(r)), expected, "t={} r={}", t, r);
        }
    }

    #[test]
    fn test_build_cache_key_uses_prefix_and_url() {
        let key = build_cache_key("twitter", URL, DEFAULT_REQUESTS_PER_HOUR);
        assert!(key.starts_with("twitter:"));
        assert!(key.ends_with(URL));
    }
}
