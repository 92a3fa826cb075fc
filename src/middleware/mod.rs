/// 中间件 / Middleware
pub mod rate_limiter;

pub use rate_limiter::{RateLimitConfig, RateLimitMiddleware, RateLimiter};
