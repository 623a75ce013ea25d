//! Admission metrics collected as an injected observer.
//!
//! Lightweight relaxed atomic counters with zero allocations in the hot
//! path. The facade calls the increment hooks; nothing in the decision path
//! mutates ambient global state, which keeps it testable without a metrics
//! backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::resolver::IdentityClass;

/// Counters exposed by the admission layer.
pub struct Metrics {
    /// Server start time
    start_time: Instant,

    /// Admissions per identity class
    pub allowed_user: AtomicU64,
    pub allowed_ip: AtomicU64,

    /// Denials per identity class
    pub blocked_user: AtomicU64,
    pub blocked_ip: AtomicU64,

    /// Requests decided by the fallback limiter
    pub degraded: AtomicU64,

    /// Engine evaluation failures (including timeouts)
    pub engine_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            allowed_user: AtomicU64::new(0),
            allowed_ip: AtomicU64::new(0),
            blocked_user: AtomicU64::new(0),
            blocked_ip: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            engine_errors: AtomicU64::new(0),
        }
    }

    /// Record an admitted request.
    pub fn record_allowed(&self, class: IdentityClass) {
        match class {
            IdentityClass::User => self.allowed_user.fetch_add(1, Ordering::Relaxed),
            IdentityClass::Ip => self.allowed_ip.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Record a denied request.
    pub fn record_blocked(&self, class: IdentityClass) {
        match class {
            IdentityClass::User => self.blocked_user.fetch_add(1, Ordering::Relaxed),
            IdentityClass::Ip => self.blocked_ip.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Record a request decided in degraded mode (fail-open fallback).
    pub fn record_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed engine evaluation.
    pub fn record_engine_error(&self) {
        self.engine_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(1024);

        output.push_str("# HELP gatecrab_uptime_seconds Time since server start in seconds\n");
        output.push_str("# TYPE gatecrab_uptime_seconds gauge\n");
        output.push_str(&format!(
            "gatecrab_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        output.push_str("# HELP rate_limit_allowed_total Total number of allowed requests\n");
        output.push_str("# TYPE rate_limit_allowed_total counter\n");
        output.push_str(&format!(
            "rate_limit_allowed_total{{identity=\"user\"}} {}\n",
            self.allowed_user.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "rate_limit_allowed_total{{identity=\"ip\"}} {}\n\n",
            self.allowed_ip.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP rate_limit_blocked_total Total number of blocked requests\n");
        output.push_str("# TYPE rate_limit_blocked_total counter\n");
        output.push_str(&format!(
            "rate_limit_blocked_total{{identity=\"user\"}} {}\n",
            self.blocked_user.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "rate_limit_blocked_total{{identity=\"ip\"}} {}\n\n",
            self.blocked_ip.load(Ordering::Relaxed)
        ));

        output.push_str(
            "# HELP rate_limit_degraded_total Total number of requests served in degraded mode\n",
        );
        output.push_str("# TYPE rate_limit_degraded_total counter\n");
        output.push_str(&format!(
            "rate_limit_degraded_total {}\n\n",
            self.degraded.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP rate_limit_errors_total Total number of rate limiter errors\n");
        output.push_str("# TYPE rate_limit_errors_total counter\n");
        output.push_str(&format!(
            "rate_limit_errors_total {}\n",
            self.engine_errors.load(Ordering::Relaxed)
        ));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.allowed_user.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.allowed_ip.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.blocked_user.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.blocked_ip.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.degraded.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.engine_errors.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_decisions_per_identity_class() {
        let metrics = Metrics::new();

        metrics.record_allowed(IdentityClass::User);
        metrics.record_allowed(IdentityClass::Ip);
        metrics.record_allowed(IdentityClass::Ip);
        metrics.record_blocked(IdentityClass::Ip);

        assert_eq!(metrics.allowed_user.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.allowed_ip.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.blocked_user.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.blocked_ip.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();

        metrics.record_allowed(IdentityClass::User);
        metrics.record_blocked(IdentityClass::Ip);
        metrics.record_degraded();
        metrics.record_engine_error();

        let output = metrics.export_prometheus();

        assert!(output.contains("gatecrab_uptime_seconds"));
        assert!(output.contains("rate_limit_allowed_total{identity=\"user\"} 1"));
        assert!(output.contains("rate_limit_allowed_total{identity=\"ip\"} 0"));
        assert!(output.contains("rate_limit_blocked_total{identity=\"ip\"} 1"));
        assert!(output.contains("rate_limit_degraded_total 1"));
        assert!(output.contains("rate_limit_errors_total 1"));
    }
}
