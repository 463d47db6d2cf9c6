//! HTTP surface: the rate-limiting middleware and the decision API.

mod error;
mod middleware;
mod server;
mod service;
mod state;

pub use error::{ApiError, ErrorBody};
pub use middleware::{protect, rate_limit_middleware};
pub use server::HttpServer;
pub use service::{router, CheckRequest, CheckResponse, LimiterSummary};
pub use state::AppState;
