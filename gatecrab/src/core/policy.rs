use std::error::Error;
use std::fmt;

/// Rate limit parameters for one identity class.
///
/// `capacity` is the burst size of the bucket, `refill_rate` is how many
/// tokens flow back per second. Both are static configuration; nothing
/// derives them at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    capacity: f64,
    refill_rate: f64,
}

impl RateLimitPolicy {
    /// Create a validated policy.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::CapacityTooSmall`] if `capacity` is below one token
    /// - [`PolicyError::NonPositiveRefillRate`] if `refill_rate` is zero or
    ///   negative
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, PolicyError> {
        if !capacity.is_finite() || capacity < 1.0 {
            return Err(PolicyError::CapacityTooSmall(capacity));
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(PolicyError::NonPositiveRefillRate(refill_rate));
        }
        Ok(RateLimitPolicy {
            capacity,
            refill_rate,
        })
    }

    /// Maximum tokens the bucket can hold.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens replenished per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// How long a denied caller should wait before one token is available
    /// again, rounded up to whole seconds.
    pub fn retry_after_secs(&self) -> u64 {
        (1.0 / self.refill_rate).ceil().max(1.0) as u64
    }
}

/// Errors raised when constructing a [`RateLimitPolicy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyError {
    /// Capacity must admit at least one request
    CapacityTooSmall(f64),
    /// Refill rate must be positive
    NonPositiveRefillRate(f64),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::CapacityTooSmall(c) => {
                write!(f, "capacity must be at least 1, got {c}")
            }
            PolicyError::NonPositiveRefillRate(r) => {
                write!(f, "refill rate must be positive, got {r}")
            }
        }
    }
}

impl Error for PolicyError {}
