//! Decision API handlers.
//!
//! Lets a process that cannot embed the middleware ask for a verdict over
//! HTTP. A check either names a limiter directly or describes the request
//! (method, path, client address) and lets the route policy pick one.

use std::net::IpAddr;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::error::ApiError;
use super::state::AppState;
use crate::ratelimit::{ClientKey, Decision, RateLimitStatus, DEFAULT_LIMITER};

/// Body of `POST /v1/check`.
///
/// Either `limiter` or the `method`/`path` pair selects the limiter; giving
/// both is rejected.
#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    /// Limiter to consult when no route is given
    #[serde(default)]
    pub limiter: Option<String>,
    /// Client key; derived from the address fields when absent
    #[serde(default)]
    pub key: Option<String>,
    /// Request method, matched against the route policy
    #[serde(default)]
    pub method: Option<String>,
    /// Request path, matched against the route policy
    #[serde(default)]
    pub path: Option<String>,
    /// Direct peer address of the client
    #[serde(default)]
    pub remote_addr: Option<IpAddr>,
    /// Raw `X-Forwarded-For` value
    #[serde(default)]
    pub forwarded_for: Option<String>,
}

/// Verdict returned by `POST /v1/check`.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub decision: Decision,
    /// False when the described route is not rate limited
    pub limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_after_ms: Option<u64>,
}

impl CheckResponse {
    fn unlimited() -> Self {
        Self {
            decision: Decision::Admit,
            limited: false,
            limiter: None,
            key: None,
            count: None,
            limit: None,
            remaining: None,
            reset_at: None,
            reset_after_ms: None,
        }
    }

    fn from_status(limiter: String, key: String, status: &RateLimitStatus) -> Self {
        Self {
            decision: status.decision,
            limited: true,
            limiter: Some(limiter),
            key: Some(key),
            count: Some(status.count),
            limit: Some(status.limit),
            remaining: Some(status.remaining),
            reset_at: i64::try_from(status.window_reset_at)
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            reset_after_ms: Some(status.reset_after_ms),
        }
    }
}

/// Entry in `GET /v1/limiters`.
#[derive(Debug, Serialize)]
pub struct LimiterSummary {
    pub name: String,
    pub window_ms: u64,
    pub max_requests: u64,
    pub tracked_keys: usize,
}

/// Build the decision API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/check", post(check))
        .route("/v1/limiters", get(limiters))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[instrument(skip_all, fields(limiter = ?req.limiter, path = ?req.path))]
async fn check(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let limiter_name = match (req.method.as_deref(), req.path.as_deref()) {
        (Some(_), Some(_)) if req.limiter.is_some() => {
            return Err(ApiError::BadRequest(
                "limiter cannot be combined with method and path".to_string(),
            ))
        }
        (Some(method), Some(path)) => match state.policy().find(method, path) {
            Some(rule) => rule.limiter.clone(),
            None => {
                debug!(method = %method, path = %path, "Route is not rate limited");
                return Ok(Json(CheckResponse::unlimited()));
            }
        },
        (None, None) => req
            .limiter
            .clone()
            .unwrap_or_else(|| DEFAULT_LIMITER.to_string()),
        _ => {
            return Err(ApiError::BadRequest(
                "method and path must be given together".to_string(),
            ))
        }
    };

    let limiter = state
        .registry()
        .get(&limiter_name)
        .ok_or_else(|| ApiError::NotFound(format!("limiter '{}' not found", limiter_name)))?;

    let key = match req.key {
        Some(key) => key,
        None => ClientKey::derive(req.remote_addr, req.forwarded_for.as_deref()).to_string(),
    };

    let status = limiter.check_rate_limit(&key).await;

    info!(
        limiter = %limiter_name,
        key = %key,
        decision = ?status.decision,
        "Rate limit decision made"
    );

    Ok(Json(CheckResponse::from_status(limiter_name, key, &status)))
}

async fn limiters(State(state): State<AppState>) -> Json<Vec<LimiterSummary>> {
    let summaries = state
        .registry()
        .iter()
        .map(|(name, limiter)| LimiterSummary {
            name: name.to_string(),
            window_ms: limiter.config().window_ms,
            max_requests: limiter.config().max_requests,
            tracked_keys: limiter.tracked_keys(),
        })
        .collect();

    Json(summaries)
}
