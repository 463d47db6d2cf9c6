//! Route rules deciding which requests are rate limited.
//!
//! A request is subject to limiting when its method and path match a rule;
//! the rule names the limiter whose window table it is counted in. Rules that
//! name the same limiter share one bucket per client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Name of the limiter used when a rule does not specify one.
pub const DEFAULT_LIMITER: &str = "default";

/// A single rate-limited route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// HTTP method to match, case-insensitive; `*` matches any method
    pub method: String,
    /// Exact path, or a prefix ending in `/*`
    pub path: String,
    /// Name of the limiter that counts matching requests
    #[serde(default = "default_limiter_name")]
    pub limiter: String,
    /// Optional label used in logs
    #[serde(default)]
    pub name: Option<String>,
}

fn default_limiter_name() -> String {
    DEFAULT_LIMITER.to_string()
}

impl RouteRule {
    /// Create a rule counted by the named limiter.
    pub fn new(method: &str, path: &str, limiter: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            limiter: limiter.to_string(),
            name: None,
        }
    }

    /// Whether this rule applies to a request.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        let method_matches = self.method == "*" || self.method.eq_ignore_ascii_case(method);
        if !method_matches {
            return false;
        }

        match self.path.strip_suffix("/*") {
            Some(prefix) => path == prefix || path.starts_with(&format!("{}/", prefix)),
            None => self.path == path,
        }
    }

    /// Label for logging: the rule name, or `METHOD path`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} {}", self.method.to_ascii_uppercase(), self.path),
        }
    }
}

/// Ordered set of route rules. The first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutePolicy {
    routes: Vec<RouteRule>,
}

impl Default for RoutePolicy {
    /// Sign-in and poll creation share the default limiter.
    fn default() -> Self {
        Self::new(vec![
            RouteRule::new("POST", "/login", DEFAULT_LIMITER),
            RouteRule::new("POST", "/polls", DEFAULT_LIMITER),
        ])
    }
}

impl RoutePolicy {
    /// Create a policy from an ordered list of rules.
    pub fn new(routes: Vec<RouteRule>) -> Self {
        Self { routes }
    }

    /// A policy that limits nothing.
    pub fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    /// Load rules from a YAML file containing a list of routes.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading route rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML list.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Find the first rule matching a request.
    pub fn find(&self, method: &str, path: &str) -> Option<&RouteRule> {
        self.routes.iter().find(|rule| rule.matches(method, path))
    }

    /// All rules, in match order.
    pub fn routes(&self) -> &[RouteRule] {
        &self.routes
    }
}
