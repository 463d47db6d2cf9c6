//! Named limiters built from configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::limiter::{LimiterConfig, RateLimiter};
use super::rules::RoutePolicy;
use crate::error::{PollguardError, Result};

/// Canonical form of a limiter name. Names are matched case-insensitively.
pub fn normalize_limiter_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// A set of independently configured limiters, looked up by name.
///
/// Every in-process limiter shares the registry's clock but owns its own
/// record table.
pub struct LimiterRegistry {
    limiters: BTreeMap<String, Arc<dyn RateLimiterBackend>>,
    clock: Arc<dyn Clock>,
}

impl LimiterRegistry {
    /// Build limiters reading the system clock.
    pub fn new(configs: &BTreeMap<String, LimiterConfig>, policy: &RoutePolicy) -> Result<Self> {
        Self::with_clock(configs, policy, Arc::new(SystemClock))
    }

    /// Build limiters with an explicit time source.
    ///
    /// Fails if any limiter configuration is invalid or a route names a
    /// limiter that is not configured.
    pub fn with_clock(
        configs: &BTreeMap<String, LimiterConfig>,
        policy: &RoutePolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut backends: BTreeMap<String, Arc<dyn RateLimiterBackend>> = BTreeMap::new();
        for (name, config) in configs {
            let limiter = RateLimiter::with_clock(config.clone(), clock.clone())
                .map_err(|e| PollguardError::Config(format!("limiter '{}': {}", name, e)))?;
            backends.insert(name.clone(), Arc::new(limiter));
        }

        Self::from_backends(backends, policy, clock)
    }

    /// Build a registry from already constructed backends.
    ///
    /// `clock` supplies the time used by `sweep_expired`.
    pub fn from_backends(
        backends: BTreeMap<String, Arc<dyn RateLimiterBackend>>,
        policy: &RoutePolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut limiters = BTreeMap::new();
        for (name, backend) in backends {
            backend
                .config()
                .validate()
                .map_err(|e| PollguardError::Config(format!("limiter '{}': {}", name, e)))?;

            let key = normalize_limiter_name(&name);
            if limiters.contains_key(&key) {
                return Err(PollguardError::Config(format!(
                    "limiter '{}' is defined more than once",
                    key
                )));
            }

            debug!(
                limiter = %key,
                window_ms = backend.config().window_ms,
                max_requests = backend.config().max_requests,
                "Configured limiter"
            );
            limiters.insert(key, backend);
        }

        for rule in policy.routes() {
            if !limiters.contains_key(&normalize_limiter_name(&rule.limiter)) {
                return Err(PollguardError::Config(format!(
                    "route '{}' refers to unknown limiter '{}'",
                    rule.label(),
                    rule.limiter
                )));
            }
        }

        info!(
            limiters = limiters.len(),
            routes = policy.routes().len(),
            "Limiter registry initialized"
        );

        Ok(Self { limiters, clock })
    }

    /// Get a limiter by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn RateLimiterBackend>> {
        self.limiters
            .get(name)
            .or_else(|| self.limiters.get(&normalize_limiter_name(name)))
    }

    /// Iterate over limiters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn RateLimiterBackend>)> {
        self.limiters.iter().map(|(name, limiter)| (name.as_str(), limiter))
    }

    /// Number of configured limiters.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no limiters are configured.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Remove expired records from every limiter.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        self.limiters
            .values()
            .map(|limiter| limiter.sweep_expired(now))
            .sum()
    }

    /// Total keys tracked across all limiters.
    pub fn tracked_keys(&self) -> usize {
        self.limiters.values().map(|limiter| limiter.tracked_keys()).sum()
    }
}

impl std::fmt::Debug for LimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterRegistry")
            .field("limiters", &self.limiters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::{ManualClock, Timestamp};
    use crate::ratelimit::record::{Decision, RateLimitRecord, RateLimitStatus};
    use crate::ratelimit::rules::{RouteRule, DEFAULT_LIMITER};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn configs(entries: &[(&str, u64, u64)]) -> BTreeMap<String, LimiterConfig> {
        entries
            .iter()
            .map(|(name, window, max)| (name.to_string(), LimiterConfig::new(*window, *max)))
            .collect()
    }

    fn check(registry: &LimiterRegistry, name: &str, key: &str) -> Decision {
        let limiter = registry.get(name).unwrap();
        tokio_test::block_on(limiter.check_rate_limit(key)).decision
    }

    /// Rejects everything and remembers how often it was asked.
    struct DenyAll {
        config: LimiterConfig,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateLimiterBackend for DenyAll {
        async fn check_rate_limit(&self, _key: &str) -> RateLimitStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let record = RateLimitRecord::open(0, self.config.window_ms);
            RateLimitStatus::new(Decision::Reject, &record, self.config.max_requests, 0)
        }

        fn config(&self) -> &LimiterConfig {
            &self.config
        }

        fn tracked_keys(&self) -> usize {
            0
        }

        fn sweep_expired(&self, _now: Timestamp) -> usize {
            0
        }
    }

    #[test]
    fn test_registry_builds_named_limiters() {
        let registry = LimiterRegistry::new(
            &configs(&[("default", 60_000, 10), ("votes", 1_000, 3)]),
            &RoutePolicy::default(),
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("votes").unwrap().config().max_requests, 3);
        assert!(registry.get("missing").is_none());

        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["default", "votes"]);
    }

    #[test]
    fn test_unknown_route_limiter_rejected() {
        let policy = RoutePolicy::new(vec![RouteRule::new("POST", "/login", "strict")]);
        let err = LimiterRegistry::new(&configs(&[("default", 60_000, 10)]), &policy).unwrap_err();
        assert!(matches!(err, PollguardError::Config(msg) if msg.contains("strict")));
    }

    #[test]
    fn test_invalid_limiter_config_rejected() {
        let err = LimiterRegistry::new(&configs(&[("default", 60_000, 0)]), &RoutePolicy::empty())
            .unwrap_err();
        assert!(matches!(err, PollguardError::Config(msg) if msg.contains("default")));
    }

    #[test]
    fn test_limiter_names_ignore_case() {
        let policy = RoutePolicy::new(vec![RouteRule::new("POST", "/polls", "VOTES")]);
        let registry =
            LimiterRegistry::new(&configs(&[("Votes", 60_000, 2)]), &policy).unwrap();

        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["votes"]);
        assert!(registry.get("votes").is_some());
        assert!(registry.get("Votes").is_some());
    }

    #[test]
    fn test_names_differing_only_in_case_rejected() {
        let err = LimiterRegistry::new(
            &configs(&[("Votes", 60_000, 2), ("votes", 60_000, 5)]),
            &RoutePolicy::empty(),
        )
        .unwrap_err();
        assert!(matches!(err, PollguardError::Config(msg) if msg.contains("more than once")));
    }

    #[test]
    fn test_limiters_are_independent() {
        let clock = Arc::new(ManualClock::new(0));
        let registry = LimiterRegistry::with_clock(
            &configs(&[("default", 60_000, 1), ("votes", 60_000, 1)]),
            &RoutePolicy::empty(),
            clock,
        )
        .unwrap();

        assert_eq!(check(&registry, DEFAULT_LIMITER, "1.2.3.4"), Decision::Admit);
        assert_eq!(check(&registry, DEFAULT_LIMITER, "1.2.3.4"), Decision::Reject);
        assert_eq!(check(&registry, "votes", "1.2.3.4"), Decision::Admit);
        assert_eq!(registry.tracked_keys(), 2);
    }

    #[test]
    fn test_sweep_across_limiters() {
        let clock = Arc::new(ManualClock::new(0));
        let registry = LimiterRegistry::with_clock(
            &configs(&[("fast", 1_000, 5), ("slow", 60_000, 5)]),
            &RoutePolicy::empty(),
            clock.clone(),
        )
        .unwrap();

        check(&registry, "fast", "a");
        check(&registry, "slow", "a");

        clock.set(1_000);
        assert_eq!(registry.sweep_expired(), 1);
        assert_eq!(registry.tracked_keys(), 1);
    }

    #[test]
    fn test_custom_backend() {
        let deny = Arc::new(DenyAll {
            config: LimiterConfig::new(60_000, 5),
            calls: AtomicUsize::new(0),
        });
        let mut backends: BTreeMap<String, Arc<dyn RateLimiterBackend>> = BTreeMap::new();
        backends.insert(DEFAULT_LIMITER.to_string(), deny.clone());

        let registry =
            LimiterRegistry::from_backends(backends, &RoutePolicy::default(), Arc::new(SystemClock))
                .unwrap();

        assert_eq!(check(&registry, DEFAULT_LIMITER, "a"), Decision::Reject);
        assert_eq!(deny.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get(DEFAULT_LIMITER).unwrap().config().max_requests, 5);
    }

    #[test]
    fn test_custom_backend_config_validated() {
        let mut backends: BTreeMap<String, Arc<dyn RateLimiterBackend>> = BTreeMap::new();
        backends.insert(
            "broken".to_string(),
            Arc::new(DenyAll {
                config: LimiterConfig::new(0, 5),
                calls: AtomicUsize::new(0),
            }),
        );

        let err = LimiterRegistry::from_backends(backends, &RoutePolicy::empty(), Arc::new(SystemClock))
            .unwrap_err();
        assert!(matches!(err, PollguardError::Config(msg) if msg.contains("broken")));
    }
}
