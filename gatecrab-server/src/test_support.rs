//! Scripted engines for exercising the facade and middleware without a
//! running store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gatecrab::RateLimitPolicy;

use crate::engine::{BucketEngine, EngineDecision, EngineError};

/// Always answers with the same decision.
pub struct StaticEngine {
    pub allowed: bool,
    pub remaining: f64,
}

#[async_trait]
impl BucketEngine for StaticEngine {
    async fn evaluate(
        &self,
        _key: &str,
        _policy: &RateLimitPolicy,
    ) -> Result<EngineDecision, EngineError> {
        Ok(EngineDecision {
            allowed: self.allowed,
            remaining: self.remaining,
        })
    }
}

/// Always fails as if the store were down.
pub struct UnavailableEngine;

#[async_trait]
impl BucketEngine for UnavailableEngine {
    async fn evaluate(
        &self,
        _key: &str,
        _policy: &RateLimitPolicy,
    ) -> Result<EngineDecision, EngineError> {
        Err(EngineError::Unavailable("store offline".to_string()))
    }
}

/// Never answers within any reasonable timeout.
pub struct HangingEngine;

#[async_trait]
impl BucketEngine for HangingEngine {
    async fn evaluate(
        &self,
        _key: &str,
        _policy: &RateLimitPolicy,
    ) -> Result<EngineDecision, EngineError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(EngineDecision {
            allowed: true,
            remaining: 0.0,
        })
    }
}

/// Consumes real tokens from an in-memory map (no refill), so tests can
/// walk a bucket down to empty.
pub struct InMemoryEngine {
    buckets: Mutex<HashMap<String, f64>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        InMemoryEngine {
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BucketEngine for InMemoryEngine {
    async fn evaluate(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<EngineDecision, EngineError> {
        let mut buckets = self.buckets.lock().unwrap();
        let tokens = buckets.entry(key.to_string()).or_insert(policy.capacity());
        if *tokens >= 1.0 {
            *tokens -= 1.0;
            Ok(EngineDecision {
                allowed: true,
                remaining: *tokens,
            })
        } else {
            Ok(EngineDecision {
                allowed: false,
                remaining: *tokens,
            })
        }
    }
}
