//! Rate limiting logic and state management.

mod backend;
mod clock;
mod key;
mod limiter;
mod record;
mod registry;
mod rules;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use key::{ClientKey, FORWARDED_FOR_HEADER, UNKNOWN_CLIENT};
pub use limiter::{LimiterConfig, RateLimiter};
pub use record::{Decision, RateLimitRecord, RateLimitStatus};
pub use registry::{normalize_limiter_name, LimiterRegistry};
pub use rules::{RoutePolicy, RouteRule, DEFAULT_LIMITER};
