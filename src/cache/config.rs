//! Cache configuration.
//!
//! Runtime view of the `[store]` settings section.

use std::num::NonZeroU32;
use std::time::Duration;

const DEFAULT_TTL_SECS: u64 = 600;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_OFFLOAD_THRESHOLD_BYTES: usize = 64 * 1024;
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_CONNECT_INITIAL_BACKOFF_MS: u64 = 100;
const DEFAULT_CONNECT_MAX_BACKOFF_MS: u64 = 3_000;
const DEFAULT_CONNECT_MAX_ELAPSED_SECS: u64 = 300;

/// Request header carrying a per-request TTL override in seconds.
pub const TTL_HEADER: &str = "ex";

/// Longest TTL any entry may carry (one year); larger requests are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Store values zlib-compressed and base64 encoded.
    pub compression: bool,
    /// TTL used when the request carries no valid `ex` header.
    pub default_ttl: Duration,
    /// Largest request or response body the middleware buffers.
    pub max_body_bytes: usize,
    /// Payloads at least this large are encoded on the blocking pool.
    pub offload_threshold_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            compression: true,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            offload_threshold_bytes: DEFAULT_OFFLOAD_THRESHOLD_BYTES,
        }
    }
}

impl From<&crate::config::StoreSettings> for CacheConfig {
    fn from(settings: &crate::config::StoreSettings) -> Self {
        Self {
            compression: settings.compression,
            default_ttl: settings.default_ttl,
            max_body_bytes: settings.max_body_bytes,
            offload_threshold_bytes: settings.offload_threshold_bytes,
        }
    }
}

impl CacheConfig {
    /// Resolve the TTL for a request from its `ex` header value.
    ///
    /// Missing, unparsable and zero values fall back to the default; values
    /// above [`MAX_TTL`] are clamped to it.
    pub fn ttl_for(&self, header: Option<&str>) -> Duration {
        header
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(self.default_ttl)
            .min(MAX_TTL)
    }
}

/// Bounded exponential backoff for the startup connection.
#[derive(Debug, Clone)]
pub struct ConnectPolicy {
    pub max_attempts: NonZeroU32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_elapsed: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(DEFAULT_CONNECT_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
            initial_backoff: Duration::from_millis(DEFAULT_CONNECT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_CONNECT_MAX_BACKOFF_MS),
            max_elapsed: Duration::from_secs(DEFAULT_CONNECT_MAX_ELAPSED_SECS),
        }
    }
}

impl From<&crate::config::StoreSettings> for ConnectPolicy {
    fn from(settings: &crate::config::StoreSettings) -> Self {
        Self {
            max_attempts: settings.connect_attempts,
            initial_backoff: settings.connect_initial_backoff,
            max_backoff: settings.connect_max_backoff,
            max_elapsed: settings.connect_max_elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.compression);
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.max_body_bytes, 1024 * 1024);

        let policy = ConnectPolicy::default();
        assert_eq!(policy.max_attempts.get(), 10);
        assert_eq!(policy.max_backoff, Duration::from_secs(3));
    }

    #[test]
    fn ttl_header_overrides_default() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_for(Some("30")), Duration::from_secs(30));
        assert_eq!(config.ttl_for(Some(" 5 ")), Duration::from_secs(5));
    }

    #[test]
    fn invalid_ttl_header_falls_back() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_for(None), config.default_ttl);
        assert_eq!(config.ttl_for(Some("soon")), config.default_ttl);
        assert_eq!(config.ttl_for(Some("0")), config.default_ttl);
        assert_eq!(config.ttl_for(Some("-4")), config.default_ttl);
    }

    #[test]
    fn oversized_ttl_header_is_clamped() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_for(Some("18446744073709551615")), MAX_TTL);
        assert_eq!(config.ttl_for(Some("99999999999")), MAX_TTL);
        // Too large for u64 at all: unparsable, so the default applies.
        assert_eq!(
            config.ttl_for(Some("99999999999999999999999")),
            config.default_ttl
        );
    }
}
