// Token bucket rate limiting
// Author: kelexine (https://github.com/kelexine)

pub mod bucket;
pub mod limiter;
pub mod models;

pub use bucket::TokenBucket;
pub use limiter::RateLimiter;
pub use models::{Acquisition, RateLimitConfig, RateLimitStats};
