//! Rate limiter trait for abstracting over where window state lives.

use async_trait::async_trait;

use super::clock::Timestamp;
use super::limiter::{LimiterConfig, RateLimiter};
use super::record::RateLimitStatus;

/// Trait for rate limiter implementations.
///
/// The registry stores limiters behind this trait, so the middleware and the
/// decision API work the same against the in-process `RateLimiter` or any
/// other implementation handed to `LimiterRegistry::from_backends`.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Check and count a request for `key`.
    async fn check_rate_limit(&self, key: &str) -> RateLimitStatus;

    /// Window length and limit this backend enforces.
    fn config(&self) -> &LimiterConfig;

    /// Number of keys currently tracked.
    fn tracked_keys(&self) -> usize;

    /// Drop state for windows that ended at or before `now`.
    fn sweep_expired(&self, now: Timestamp) -> usize;
}

#[async_trait]
impl RateLimiterBackend for RateLimiter {
    async fn check_rate_limit(&self, key: &str) -> RateLimitStatus {
        self.check(key)
    }

    fn config(&self) -> &LimiterConfig {
        RateLimiter::config(self)
    }

    fn tracked_keys(&self) -> usize {
        self.len()
    }

    fn sweep_expired(&self, now: Timestamp) -> usize {
        RateLimiter::sweep_expired(self, now)
    }
}

impl std::fmt::Debug for dyn RateLimiterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterBackend")
            .field("config", self.config())
            .field("tracked_keys", &self.tracked_keys())
            .finish()
    }
}
