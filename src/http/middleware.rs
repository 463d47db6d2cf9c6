//! Per-client rate limiting middleware.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use tracing::{trace, warn};

use super::error::ApiError;
use super::state::AppState;
use crate::ratelimit::{ClientKey, Decision};

/// Rate-limiting middleware. Returns 429 when a limited route's per-client
/// quota is exhausted; every other request passes through untouched.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(rule) = state.policy().find(req.method().as_str(), req.uri().path()) else {
        return Ok(next.run(req).await);
    };

    let limiter = state.registry().get(&rule.limiter).ok_or_else(|| {
        ApiError::Internal(format!("route '{}' has no limiter", rule.label()))
    })?;

    let key = ClientKey::from_request(&req);
    if key.is_unknown() {
        trace!(route = %rule.label(), "No client address, using shared bucket");
    }

    let status = limiter.check_rate_limit(key.as_str()).await;

    if status.decision == Decision::Reject {
        warn!(
            client = %key,
            route = %rule.label(),
            count = status.count,
            limit = status.limit,
            "Rejecting rate-limited request"
        );
        return Err(ApiError::TooManyRequests {
            retry_after_secs: status.retry_after_secs(),
        });
    }

    Ok(next.run(req).await)
}

/// Wrap an application router with the rate-limiting middleware.
///
/// No background task is started. Expired records are dropped on access once
/// per `sweep_interval_ms`; embedders that disable that can call
/// `LimiterRegistry::sweep_expired` themselves.
pub fn protect(app: Router, state: AppState) -> Router {
    app.layer(axum::middleware::from_fn_with_state(
        state,
        rate_limit_middleware,
    ))
}
