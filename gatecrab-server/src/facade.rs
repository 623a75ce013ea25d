//! Rate limit facade: the failure-strategy controller in front of the
//! distributed engine.
//!
//! The facade is the only place engine errors are visible. It bounds the
//! engine call with a timeout, converts any failure into a decision via the
//! configured strategy, and fires the observation hooks on the injected
//! metrics observer. Callers only ever see admitted, denied, or
//! denied-degraded; there is no unhandled failure path past this point.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gatecrab::{LocalLimiter, RateLimitPolicy};
use tokio::time::timeout;

use crate::engine::{BucketEngine, EngineError};
use crate::metrics::Metrics;
use crate::resolver::{IdentityClass, ResolvedIdentity};

/// What to do when the shared store cannot answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureStrategy {
    /// Keep serving traffic, metered by the per-instance fallback limiter.
    #[default]
    FailOpen,
    /// Deny everything until the store is back, protecting the backend.
    FailClosed,
}

impl FailureStrategy {
    /// Canonical spelling used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStrategy::FailOpen => "fail-open",
            FailureStrategy::FailClosed => "fail-closed",
        }
    }

    /// Parse a configured strategy. The hyphenated spelling is canonical and
    /// the underscored one is accepted as an alias; anything unrecognized
    /// logs a warning and falls back to fail-open instead of refusing to
    /// start.
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "fail_open" => FailureStrategy::FailOpen,
            "fail-closed" | "fail_closed" => FailureStrategy::FailClosed,
            other => {
                tracing::warn!(
                    "unrecognized failure strategy {other:?}, defaulting to fail-open"
                );
                FailureStrategy::default()
            }
        }
    }
}

impl fmt::Display for FailureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision handed to the HTTP collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Post-decision tokens; `None` when the engine was bypassed (degraded
    /// fallback or a fail-closed denial)
    pub remaining: Option<f64>,
    /// True when the fallback limiter made the call
    pub degraded: bool,
    /// Capacity of the bucket the decision was made against
    pub limit: f64,
    /// Wait hint for denied callers, in whole seconds
    pub retry_after_secs: u64,
}

/// Orchestrates the engine, the fallback limiter, and the failure strategy.
pub struct RateLimitFacade {
    engine: Arc<dyn BucketEngine>,
    fallback: LocalLimiter,
    strategy: FailureStrategy,
    engine_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl RateLimitFacade {
    /// Build a facade.
    ///
    /// The fallback limiter is sized from `fallback_policy` (the anonymous
    /// policy in the shipped configuration); while degraded, authenticated
    /// keys share that sizing. An accepted approximation of the fail-open
    /// window, not an attempt at per-class fidelity.
    pub fn new(
        engine: Arc<dyn BucketEngine>,
        fallback_policy: RateLimitPolicy,
        strategy: FailureStrategy,
        engine_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        RateLimitFacade {
            engine,
            fallback: LocalLimiter::new(fallback_policy),
            strategy,
            engine_timeout,
            metrics,
        }
    }

    /// Decide whether `identity` may proceed.
    ///
    /// The engine call is bounded by the configured timeout so a hung store
    /// cannot stall the request path or pile up waiting callers; expiry and
    /// cancellation are handled exactly like a store error.
    pub async fn decide(&self, identity: &ResolvedIdentity) -> Decision {
        let policy = &identity.policy;

        let outcome = match timeout(
            self.engine_timeout,
            self.engine.evaluate(&identity.key, policy),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::Unavailable(format!(
                "engine call exceeded {}ms",
                self.engine_timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(engine_decision) => {
                self.record_outcome(identity.class, engine_decision.allowed);
                Decision {
                    allowed: engine_decision.allowed,
                    remaining: Some(engine_decision.remaining),
                    degraded: false,
                    limit: policy.capacity(),
                    retry_after_secs: policy.retry_after_secs(),
                }
            }
            Err(err) => {
                self.metrics.record_engine_error();
                tracing::warn!(
                    key = %identity.key,
                    strategy = %self.strategy,
                    error = %err,
                    "engine evaluation failed"
                );
                self.decide_without_engine(identity, policy)
            }
        }
    }

    /// Apply the failure strategy once the engine is out of the picture.
    fn decide_without_engine(
        &self,
        identity: &ResolvedIdentity,
        policy: &RateLimitPolicy,
    ) -> Decision {
        match self.strategy {
            FailureStrategy::FailOpen => {
                self.metrics.record_degraded();
                let allowed = self.fallback.allow(&identity.key);
                self.record_outcome(identity.class, allowed);
                Decision {
                    allowed,
                    remaining: None,
                    degraded: true,
                    limit: policy.capacity(),
                    retry_after_secs: policy.retry_after_secs(),
                }
            }
            FailureStrategy::FailClosed => {
                self.record_outcome(identity.class, false);
                Decision {
                    allowed: false,
                    remaining: None,
                    degraded: false,
                    limit: policy.capacity(),
                    retry_after_secs: policy.retry_after_secs(),
                }
            }
        }
    }

    fn record_outcome(&self, class: IdentityClass, allowed: bool) {
        if allowed {
            self.metrics.record_allowed(class);
        } else {
            self.metrics.record_blocked(class);
        }
    }
}
