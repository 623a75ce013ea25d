//! # GateCrab
//!
//! Token bucket primitives for the gatecrab admission-control layer.
//!
//! This crate holds the pieces that must work without any network or async
//! runtime: the refill math itself and the in-process fallback limiter used
//! while the shared bucket store is unreachable. The distributed engine and
//! the HTTP surface live in `gatecrab-server`.
//!
//! # Example
//!
//! ```
//! use gatecrab::{LocalLimiter, RateLimitPolicy};
//!
//! let policy = RateLimitPolicy::new(5.0, 1.0).unwrap();
//! let limiter = LocalLimiter::new(policy);
//!
//! assert!(limiter.allow("ip:127.0.0.1"));
//! ```

mod core;

pub use core::{LocalLimiter, PolicyError, RateLimitPolicy, TokenBucket};
