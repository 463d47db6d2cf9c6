//! Shared state for the HTTP layer.

use std::sync::Arc;

use crate::config::PollguardConfig;
use crate::error::Result;
use crate::ratelimit::{Clock, LimiterRegistry, RoutePolicy, SystemClock};

/// State shared by the middleware and the decision API.
///
/// Cheap to clone; all clones see the same limiters.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    registry: LimiterRegistry,
    policy: RoutePolicy,
}

impl AppState {
    /// Build state from configuration, reading the system clock.
    pub fn new(config: &PollguardConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build state with an explicit time source.
    pub fn with_clock(config: &PollguardConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let registry = LimiterRegistry::with_clock(&config.limiters, &config.routes, clock)?;
        Ok(Self::from_parts(registry, config.routes.clone()))
    }

    /// Build state around an existing registry, e.g. one holding custom
    /// backends. `registry` should have been validated against `policy`.
    pub fn from_parts(registry: LimiterRegistry, policy: RoutePolicy) -> Self {
        Self {
            inner: Arc::new(AppStateInner { registry, policy }),
        }
    }

    /// The configured limiters.
    pub fn registry(&self) -> &LimiterRegistry {
        &self.inner.registry
    }

    /// The route policy.
    pub fn policy(&self) -> &RoutePolicy {
        &self.inner.policy
    }
}
