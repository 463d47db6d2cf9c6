//! Core rate limiter implementation.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock, Timestamp};
use super::record::{Decision, RateLimitRecord, RateLimitStatus};
use crate::error::{PollguardError, Result};

/// Default window length in milliseconds.
const DEFAULT_WINDOW_MS: u64 = 60_000;
/// Default number of admitted requests per key per window.
const DEFAULT_MAX_REQUESTS: u64 = 10;
/// Default minimum gap between access-triggered sweeps.
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Configuration for a single limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Length of each window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Maximum admitted requests per key per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Sweep expired records on access at most this often; zero disables
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_max_requests() -> u64 {
    DEFAULT_MAX_REQUESTS
}

fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max_requests: DEFAULT_MAX_REQUESTS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl LimiterConfig {
    /// Create a configuration with the given window and limit.
    pub fn new(window_ms: u64, max_requests: u64) -> Self {
        Self {
            window_ms,
            max_requests,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }

    /// Set the access-triggered sweep interval. Zero disables it.
    pub fn with_sweep_interval(mut self, interval_ms: u64) -> Self {
        self.sweep_interval_ms = interval_ms;
        self
    }

    /// Check that the window and limit are positive.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(PollguardError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(PollguardError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A fixed-window rate limiter keyed by opaque client identifiers.
///
/// Each key gets a counter that starts at the key's first request and resets
/// once the window has elapsed. Checks for the same key are serialized by the
/// record table's shard lock, so concurrent callers are each counted exactly
/// once.
pub struct RateLimiter {
    /// Window length and limit
    config: LimiterConfig,
    /// Per-key window records
    records: DashMap<String, RateLimitRecord>,
    /// Time source for `check`
    clock: Arc<dyn Clock>,
    /// When expired records were last swept
    last_sweep: Mutex<Timestamp>,
}

impl RateLimiter {
    /// Create a rate limiter reading the system clock.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rate limiter with an explicit time source.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let started = clock.now();

        Ok(Self {
            config,
            records: DashMap::new(),
            clock,
            last_sweep: Mutex::new(started),
        })
    }

    /// Get the limiter's configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Check and count a request for `key` at `now`.
    pub fn check_and_record(&self, key: &str, now: Timestamp) -> Decision {
        self.check_and_record_status(key, now).decision
    }

    /// Check and count a request for `key` at `now`, returning the window
    /// state after the request has been counted.
    pub fn check_and_record_status(&self, key: &str, now: Timestamp) -> RateLimitStatus {
        self.maybe_sweep(now);

        let max_requests = self.config.max_requests;
        let window_ms = self.config.window_ms;

        trace!(key = %key, now = now, "Checking rate limit");

        let (decision, record) = match self.records.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.is_expired(now) {
                    *record = RateLimitRecord::open(now, window_ms);
                    debug!(
                        key = %key,
                        window_reset_at = record.window_reset_at,
                        "Starting new rate limit window"
                    );
                    (Decision::Admit, *record)
                } else {
                    // Rejected requests still count toward the window.
                    record.count = record.count.saturating_add(1);
                    let decision = if record.count > max_requests {
                        Decision::Reject
                    } else {
                        Decision::Admit
                    };
                    (decision, *record)
                }
            }
            Entry::Vacant(vacant) => {
                let record = RateLimitRecord::open(now, window_ms);
                debug!(
                    key = %key,
                    window_reset_at = record.window_reset_at,
                    "Creating new rate limit record"
                );
                vacant.insert(record);
                (Decision::Admit, record)
            }
        };

        if decision == Decision::Reject {
            debug!(
                key = %key,
                count = record.count,
                limit = max_requests,
                "Rate limit exceeded"
            );
        }

        RateLimitStatus::new(decision, &record, max_requests, now)
    }

    /// Check and count a request for `key` at the clock's current time.
    pub fn check(&self, key: &str) -> RateLimitStatus {
        let now = self.clock.now();
        self.check_and_record_status(key, now)
    }

    /// Get a snapshot of the record for `key`, if one exists.
    pub fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.get(key).map(|r| *r.value())
    }

    /// Remove every record whose window has ended as of `now`.
    ///
    /// Returns the number of records removed.
    pub fn sweep_expired(&self, now: Timestamp) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.records.len(),
                "Swept expired rate limit records"
            );
        }
        removed
    }

    /// Sweep at the clock's current time.
    pub fn sweep(&self) -> usize {
        self.sweep_expired(self.clock.now())
    }

    /// Sweep if the configured interval has passed since the last sweep.
    fn maybe_sweep(&self, now: Timestamp) {
        let interval = self.config.sweep_interval_ms;
        if interval == 0 {
            return;
        }

        {
            let mut last_sweep = self.last_sweep.lock();
            if now.saturating_sub(*last_sweep) < interval {
                return;
            }
            *last_sweep = now;
        }

        self.sweep_expired(now);
    }

    /// Clear all records.
    pub fn clear(&self) {
        self.records.clear();
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("tracked_keys", &self.records.len())
            .finish()
    }
}
