//! Errors returned by HTTP handlers and middleware.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// API error with an HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Unknown resource.
    #[error("{0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("too many requests")]
    TooManyRequests {
        /// Seconds until the client's window resets
        retry_after_secs: u64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error code, e.g. "bad_request".
    pub error: String,
    /// Human-readable detail, if any.
    pub detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            // Body is the bare status text.
            ApiError::TooManyRequests { retry_after_secs } => {
                let status = StatusCode::TOO_MANY_REQUESTS;
                let text = status.canonical_reason().unwrap_or("Too Many Requests");
                return (
                    status,
                    [(header::RETRY_AFTER, retry_after_secs.to_string())],
                    text,
                )
                    .into_response();
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg)),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg)),
            ApiError::Internal(msg) => {
                tracing::error!(%msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", Some(msg))
            }
        };

        let body = ErrorBody {
            error: error.to_string(),
            detail,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_too_many_requests_response() {
        let response = ApiError::TooManyRequests {
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Too Many Requests");
    }

    #[tokio::test]
    async fn test_not_found_is_json() {
        let response = ApiError::NotFound("limiter 'x' not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["detail"], "limiter 'x' not found");
    }
}
