//! Distributed token bucket engine backed by the shared Redis store.
//!
//! The whole read-refill-decide-write sequence for a key runs inside a
//! single Lua script invocation, so two concurrent requests for the same key
//! can never both consume the same token. The script is a versioned artifact
//! loaded from disk once at startup; a missing artifact aborts startup
//! rather than letting the service run unprotected.
//!
//! The script is evaluated with the store's own clock (`TIME`), never the
//! caller's, which keeps refill math consistent across every application
//! instance sharing the store.

use async_trait::async_trait;
use gatecrab::RateLimitPolicy;
use redis::aio::ConnectionManager;
use redis::{Script, Value};
use thiserror::Error;

/// Outcome of one engine evaluation: the admission decision and the tokens
/// left in the bucket after it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineDecision {
    pub allowed: bool,
    pub remaining: f64,
}

/// Errors the engine can surface. Both variants are caught by the facade
/// and converted into a decision via the failure strategy; neither ever
/// means "allowed".
#[derive(Debug, Error)]
pub enum EngineError {
    /// The store could not be reached: connection failure, timeout, or pool
    /// exhaustion.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store answered, but not in the shape the wire contract promises.
    #[error("store protocol error: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
        {
            EngineError::Unavailable(err.to_string())
        } else {
            EngineError::Protocol(err.to_string())
        }
    }
}

/// Seam between the facade and the shared store, so the failure-strategy
/// logic can be exercised against scripted engines in tests.
#[async_trait]
pub trait BucketEngine: Send + Sync {
    /// Atomically evaluate one request for `key` under `policy`.
    async fn evaluate(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<EngineDecision, EngineError>;
}

/// The production engine: a multiplexed Redis connection plus the token
/// bucket script.
pub struct RedisEngine {
    conn: ConnectionManager,
    script: Script,
}

impl RedisEngine {
    /// Wrap an established connection with the loaded script source.
    pub fn new(conn: ConnectionManager, script_source: &str) -> Self {
        RedisEngine {
            conn,
            script: Script::new(script_source),
        }
    }

    /// Fetch the store's own clock in whole seconds.
    async fn store_now(&self) -> Result<i64, EngineError> {
        let mut conn = self.conn.clone();
        let (secs, _micros): (i64, i64) = redis::cmd("TIME").query_async(&mut conn).await?;
        Ok(secs)
    }
}

#[async_trait]
impl BucketEngine for RedisEngine {
    async fn evaluate(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<EngineDecision, EngineError> {
        let now = self.store_now().await?;

        let mut conn = self.conn.clone();
        let reply: Value = self
            .script
            .key(key)
            .arg(policy.capacity())
            .arg(policy.refill_rate())
            .arg(now)
            .invoke_async(&mut conn)
            .await?;

        parse_reply(&reply)
    }
}

/// Decode the script reply: `[allowed (0|1), remaining tokens]`.
///
/// Redis collapses whole Lua numbers to integers and the script returns the
/// token count as a string to keep its fraction, so `remaining` may arrive
/// as an integer, a bulk string, or (under RESP3) a double.
fn parse_reply(reply: &Value) -> Result<EngineDecision, EngineError> {
    let items = match reply {
        Value::Array(items) if items.len() == 2 => items,
        other => {
            return Err(EngineError::Protocol(format!(
                "expected a two element reply, got {other:?}"
            )));
        }
    };

    let allowed = match items[0] {
        Value::Int(0) => false,
        Value::Int(1) => true,
        ref other => {
            return Err(EngineError::Protocol(format!(
                "allowed flag must be 0 or 1, got {other:?}"
            )));
        }
    };

    let remaining = match &items[1] {
        Value::Int(n) => *n as f64,
        Value::Double(d) => *d,
        Value::BulkString(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| {
                EngineError::Protocol("remaining tokens is not a number".to_string())
            })?,
        other => {
            return Err(EngineError::Protocol(format!(
                "unexpected remaining tokens value: {other:?}"
            )));
        }
    };

    Ok(EngineDecision { allowed, remaining })
}
