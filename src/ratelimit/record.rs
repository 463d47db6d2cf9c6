//! Per-client window records and check results.

use serde::Serialize;

use super::clock::Timestamp;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// The request is within the window's quota.
    Admit,
    /// The window's quota is exhausted.
    Reject,
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// Tracking entry for a single client key.
///
/// `count` is at least 1 once a record exists, and `window_reset_at` is fixed
/// for the lifetime of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Requests observed in the current window, rejected ones included
    pub count: u64,
    /// When the current window expires
    pub window_reset_at: Timestamp,
}

impl RateLimitRecord {
    /// Open a new window at `now` counting the triggering request.
    pub fn open(now: Timestamp, window_ms: u64) -> Self {
        Self {
            count: 1,
            window_reset_at: now.saturating_add(window_ms),
        }
    }

    /// Whether the window has ended as of `now`.
    ///
    /// A request landing exactly on `window_reset_at` belongs to the next
    /// window.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.window_reset_at <= now
    }
}

/// Detailed result of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether the request was admitted
    pub decision: Decision,
    /// Count for the key after this request
    pub count: u64,
    /// Maximum admitted requests per window
    pub limit: u64,
    /// Admits left in this window
    pub remaining: u64,
    /// When the current window expires
    pub window_reset_at: Timestamp,
    /// Milliseconds from the check until the window expires
    pub reset_after_ms: u64,
}

impl RateLimitStatus {
    /// Build the status for `record` as observed at `now`.
    pub fn new(
        decision: Decision,
        record: &RateLimitRecord,
        limit: u64,
        now: Timestamp,
    ) -> Self {
        Self {
            decision,
            count: record.count,
            limit,
            remaining: limit.saturating_sub(record.count),
            window_reset_at: record.window_reset_at,
            reset_after_ms: record.window_reset_at.saturating_sub(now),
        }
    }

    /// Seconds a rejected client should wait, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_after_ms.div_ceil(1000)
    }
}
