//! Configuration management for Pollguard.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::{PollguardError, Result};
use crate::ratelimit::{normalize_limiter_name, LimiterConfig, RoutePolicy, DEFAULT_LIMITER};

/// Prefix for environment overrides, e.g. `POLLGUARD__SERVER__HTTP_ADDR`.
const ENV_PREFIX: &str = "POLLGUARD";

/// Main configuration for the Pollguard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollguardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named limiters
    #[serde(default = "default_limiters")]
    pub limiters: BTreeMap<String, LimiterConfig>,

    /// Rate-limited routes, first match wins
    #[serde(default)]
    pub routes: RoutePolicy,
}

impl Default for PollguardConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            limiters: default_limiters(),
            routes: RoutePolicy::default(),
        }
    }
}

fn default_limiters() -> BTreeMap<String, LimiterConfig> {
    let mut limiters = BTreeMap::new();
    limiters.insert(DEFAULT_LIMITER.to_string(), LimiterConfig::default());
    limiters
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Interval between background sweeps of expired records, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_sweep_interval() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl PollguardConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.normalize_limiter_names()
    }

    /// Load configuration from an optional YAML file layered under
    /// `POLLGUARD__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.normalize_limiter_names()
    }

    /// Lowercase limiter names and the routes that refer to them. The layered
    /// loader lowercases map keys, so both loaders agree on this form.
    fn normalize_limiter_names(mut self) -> Result<Self> {
        let mut limiters = BTreeMap::new();
        for (name, limiter) in std::mem::take(&mut self.limiters) {
            let key = normalize_limiter_name(&name);
            if limiters.insert(key.clone(), limiter).is_some() {
                return Err(PollguardError::Config(format!(
                    "limiter '{}' is defined more than once",
                    key
                )));
            }
        }
        self.limiters = limiters;

        let routes = self
            .routes
            .routes()
            .iter()
            .cloned()
            .map(|mut rule| {
                rule.limiter = normalize_limiter_name(&rule.limiter);
                rule
            })
            .collect();
        self.routes = RoutePolicy::new(routes);

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RouteRule;

    #[test]
    fn test_default_config() {
        let config = PollguardConfig::default();
        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.server.sweep_interval_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.routes.find("POST", "/login").is_some());
        assert_eq!(config.limiters[DEFAULT_LIMITER], LimiterConfig::default());
    }

    #[test]
    fn test_serde_defaults_include_default_limiter() {
        let config = PollguardConfig::from_yaml("{}").unwrap();
        let limiter = &config.limiters[DEFAULT_LIMITER];
        assert_eq!(limiter.window_ms, 60_000);
        assert_eq!(limiter.max_requests, 10);
        assert_eq!(config.routes, RoutePolicy::default());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  http_addr: "0.0.0.0:9000"
  sweep_interval_secs: 5
logging:
  level: debug
  format: json
limiters:
  default:
    window_ms: 30000
    max_requests: 5
  votes:
    max_requests: 100
    sweep_interval_ms: 10000
routes:
  - method: POST
    path: /login
  - method: POST
    path: /polls/*
    limiter: votes
"#;
        let config = PollguardConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.http_addr.port(), 9000);
        assert_eq!(config.server.sweep_interval_secs, 5);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        assert_eq!(config.limiters["default"], LimiterConfig::new(30_000, 5));
        let votes = &config.limiters["votes"];
        assert_eq!(votes.window_ms, 60_000);
        assert_eq!(votes.max_requests, 100);
        assert_eq!(votes.sweep_interval_ms, 10_000);

        assert_eq!(
            config.routes.routes()[1],
            RouteRule::new("POST", "/polls/*", "votes")
        );
    }

    #[test]
    fn test_limiter_names_are_lowercased() {
        let yaml = r#"
limiters:
  Votes:
    max_requests: 3
routes:
  - method: POST
    path: /polls
    limiter: VOTES
"#;
        let config = PollguardConfig::from_yaml(yaml).unwrap();

        let names: Vec<&str> = config.limiters.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["votes"]);
        assert_eq!(config.routes.routes()[0].limiter, "votes");
    }

    #[test]
    fn test_duplicate_limiter_names_rejected() {
        let yaml = r#"
limiters:
  votes: {}
  Votes: {}
"#;
        let err = PollguardConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, PollguardError::Config(msg) if msg.contains("more than once")));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = PollguardConfig::from_yaml("server: [").unwrap_err();
        assert!(matches!(err, PollguardError::Config(_)));
    }

    #[test]
    fn test_sample_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/pollguard.yaml");
        let config = PollguardConfig::from_file(&path).unwrap();

        assert_eq!(config.limiters[DEFAULT_LIMITER].sweep_interval_ms, 300_000);
        assert_eq!(config.routes.find("POST", "/polls").unwrap().label(), "create-poll");

        let loaded = PollguardConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.server.http_addr, config.server.http_addr);
        assert_eq!(loaded.routes, config.routes);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = PollguardConfig::load(None).unwrap();
        assert!(config.limiters.contains_key(DEFAULT_LIMITER));
    }
}
