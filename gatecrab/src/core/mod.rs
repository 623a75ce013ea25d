//! Core building blocks shared by the distributed engine and the fallback:
//! - [`policy`]: validated per-identity-class rate limit parameters
//! - [`bucket`]: clock-injected token bucket refill math
//! - [`fallback`]: the in-process degraded-mode limiter

pub mod bucket;
pub mod fallback;
pub mod policy;


pub use bucket::TokenBucket;
pub use fallback::LocalLimiter;
pub use policy::{PolicyError, RateLimitPolicy};
