use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use super::bucket::TokenBucket;
use super::policy::RateLimitPolicy;

#[cfg(feature = "ahash")]
type BucketMap = ahash::AHashMap<String, TokenBucket>;
#[cfg(not(feature = "ahash"))]
type BucketMap = std::collections::HashMap<String, TokenBucket>;

/// In-process token bucket limiter used while the shared store is down.
///
/// State lives only in this process and refills off the local monotonic
/// clock, so during a degraded window a fleet of N instances enforces N
/// times the configured capacity for the same logical key. That inflation
/// is the accepted cost of staying available without the shared store, not
/// a bug.
///
/// One mutex guards the whole key map. Each call does an O(1)
/// refill-and-decrement under the lock with no I/O, which keeps the limiter
/// safe under concurrent callers; at very high key cardinality the lock is
/// the known contention point, and sharding the map would be the next step.
pub struct LocalLimiter {
    policy: RateLimitPolicy,
    buckets: Mutex<BucketMap>,
}

impl LocalLimiter {
    /// Create a limiter enforcing `policy` for every key it sees.
    pub fn new(policy: RateLimitPolicy) -> Self {
        LocalLimiter {
            policy,
            buckets: Mutex::new(BucketMap::default()),
        }
    }

    /// Check whether `key` may proceed. Never fails.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Clock-injected variant of [`allow`](Self::allow).
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match buckets.get_mut(key) {
            Some(bucket) => {
                bucket.try_consume(self.policy.capacity(), self.policy.refill_rate(), now)
            }
            None => {
                // A key seen for the first time admits immediately.
                buckets.insert(
                    key.to_string(),
                    TokenBucket::after_first_admit(self.policy.capacity(), now),
                );
                true
            }
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
