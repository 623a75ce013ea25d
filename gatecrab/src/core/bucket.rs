use std::time::Instant;

/// A single token bucket with continuous refill.
///
/// Time is injected by the caller so the math stays deterministic under
/// test; [`LocalLimiter`](crate::LocalLimiter) feeds it the process clock.
/// Tokens never leave `[0, capacity]`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A bucket created with `tokens` already in it.
    pub fn with_tokens(tokens: f64, now: Instant) -> Self {
        TokenBucket {
            tokens: tokens.max(0.0),
            last_refill: now,
        }
    }

    /// A bucket that has just admitted its first request: `capacity - 1`
    /// tokens remain.
    pub fn after_first_admit(capacity: f64, now: Instant) -> Self {
        Self::with_tokens(capacity - 1.0, now)
    }

    /// Refill for the time elapsed since the last call, then try to consume
    /// one token.
    pub fn try_consume(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).clamp(0.0, capacity);
        self.last_refill = now;

        if self.tokens < 1.0 {
            return false;
        }

        self.tokens -= 1.0;
        true
    }

    /// Tokens currently in the bucket (post-decision).
    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}
