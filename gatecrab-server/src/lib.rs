//! # GateCrab Server
//!
//! An admission-control layer that limits how many requests a given identity
//! (anonymous client IP or authenticated user) may issue per unit time,
//! protecting a downstream API from overload.
//!
//! ## How it works
//!
//! Every request is classified by the [`resolver`] into a bucket key and a
//! policy, then handed to the [`facade`], which asks the distributed
//! [`engine`] for an atomic token bucket decision against the shared Redis
//! store. When the store cannot answer within the configured timeout, the
//! facade applies the configured failure strategy:
//!
//! - **fail-open**: decisions come from the in-process fallback limiter
//!   (best-effort, per-instance) and responses carry a degraded marker
//! - **fail-closed**: everything is denied until the store is back
//!
//! The bucket algorithm itself runs inside a versioned Lua script loaded at
//! startup, using the store's own clock, so every instance sharing the store
//! observes one consistent refill timeline.
//!
//! ## Configuration
//!
//! Via CLI arguments or `GATECRAB_`-prefixed environment variables (CLI
//! takes precedence):
//!
//! ```bash
//! gatecrab --http-port 8080 --redis-url redis://127.0.0.1:6379 \
//!     --failure-strategy fail-open --anon-capacity 5 --anon-refill-rate 1
//!
//! # List all environment variables
//! gatecrab --list-env-vars
//! ```

pub mod config;
pub mod engine;
pub mod facade;
pub mod metrics;
pub mod middleware;
pub mod resolver;

#[cfg(test)]
pub(crate) mod test_support;
