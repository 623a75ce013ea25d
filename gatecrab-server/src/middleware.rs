//! HTTP admission middleware.
//!
//! Thin glue between axum and the facade: classify the request, ask the
//! facade for a decision, translate the decision tuple into a status code
//! and rate limit headers. `/health` and `/metrics` bypass admission
//! control so operators can always reach them.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Serialize;

use crate::facade::{Decision, RateLimitFacade};
use crate::metrics::Metrics;
use crate::resolver::{self, PolicySet, ResolveError};

const EXEMPT_PATHS: &[&str] = &["/health", "/metrics"];

/// Shared state for the admission middleware and the metrics route.
pub struct AppState {
    pub facade: RateLimitFacade,
    pub policies: PolicySet,
    pub metrics: Arc<Metrics>,
}

/// Assemble the service: the protected surface, the health check, the
/// metrics endpoint, and the admission middleware around all of it.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Stand-in for the downstream API this layer protects.
        .route("/", get(|| async { "OK" }))
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            limit_requests,
        ))
        .with_state(state)
}

/// The admission check applied to every non-exempt request.
pub async fn limit_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if EXEMPT_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string());

    let identity = match resolver::resolve(
        authorization.as_deref(),
        remote_addr.as_deref(),
        &state.policies,
    ) {
        Ok(identity) => identity,
        Err(ResolveError::InvalidClientAddress) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid client address");
        }
    };

    let decision = state.facade.decide(&identity).await;

    if !decision.allowed {
        let message = if decision.degraded {
            "rate limit exceeded (degraded)"
        } else if decision.remaining.is_none() {
            // Fail-closed denial during a store outage.
            "rate limiter unavailable"
        } else {
            "rate limit exceeded"
        };

        let mut response = error_response(StatusCode::TOO_MANY_REQUESTS, message);
        apply_rate_limit_headers(response.headers_mut(), &decision);
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(decision.retry_after_secs),
        );
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
        .into_response()
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert("X-RateLimit-Limit", number_header(decision.limit));
    if let Some(remaining) = decision.remaining {
        headers.insert("X-RateLimit-Remaining", number_header(remaining));
    }
    if decision.degraded {
        headers.insert("X-RateLimit-Degraded", HeaderValue::from_static("true"));
    }
}

fn number_header(value: f64) -> HeaderValue {
    // `{}` on f64 drops a trailing `.0`, matching the limit/remaining
    // formatting clients expect.
    HeaderValue::from_str(&value.to_string())
        .expect("formatted numbers are valid header values")
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use gatecrab::RateLimitPolicy;
    use tower::ServiceExt;

    use crate::engine::BucketEngine;
    use crate::facade::FailureStrategy;
    use crate::test_support::{InMemoryEngine, UnavailableEngine};

    fn policies() -> PolicySet {
        PolicySet {
            anonymous: RateLimitPolicy::new(5.0, 1.0).unwrap(),
            user: RateLimitPolicy::new(20.0, 5.0).unwrap(),
        }
    }

    fn state_with(engine: Arc<dyn BucketEngine>, strategy: FailureStrategy) -> Arc<AppState> {
        let metrics = Arc::new(Metrics::new());
        let policies = policies();
        let facade = RateLimitFacade::new(
            engine,
            policies.anonymous,
            strategy,
            Duration::from_millis(100),
            metrics.clone(),
        );
        Arc::new(AppState {
            facade,
            policies,
            metrics,
        })
    }

    fn request(path: &str, authorization: Option<&str>, addr: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri(path);
        if let Some(authorization) = authorization {
            builder = builder.header("Authorization", authorization);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(addr) = addr {
            request
                .extensions_mut()
                .insert(ConnectInfo::<SocketAddr>(addr.parse().unwrap()));
        }
        request
    }

    fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_anonymous_burst_walks_bucket_to_denial() {
        let app = router(state_with(
            Arc::new(InMemoryEngine::new()),
            FailureStrategy::FailOpen,
        ));

        for expected_remaining in ["4", "3", "2", "1", "0"] {
            let response = app
                .clone()
                .oneshot(request("/", None, Some("10.0.0.1:4242")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(header_str(&response, "X-RateLimit-Limit"), Some("5"));
            assert_eq!(
                header_str(&response, "X-RateLimit-Remaining"),
                Some(expected_remaining)
            );
        }

        // The sixth request is denied with a retry hint.
        let response = app
            .clone()
            .oneshot(request("/", None, Some("10.0.0.1:4242")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header_str(&response, "X-RateLimit-Remaining"), Some("0"));
        assert_eq!(header_str(&response, "Retry-After"), Some("1"));
    }

    #[tokio::test]
    async fn test_bearer_request_uses_its_own_bucket() {
        let app = router(state_with(
            Arc::new(InMemoryEngine::new()),
            FailureStrategy::FailOpen,
        ));

        // Exhaust the anonymous bucket for this address.
        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request("/", None, Some("10.0.0.1:4242")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app
            .clone()
            .oneshot(request("/", None, Some("10.0.0.1:4242")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // The same connection with a bearer credential draws from
        // "user:u1" under the larger user policy.
        let response = app
            .clone()
            .oneshot(request("/", Some("Bearer u1"), Some("10.0.0.1:4242")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "X-RateLimit-Limit"), Some("20"));
        assert_eq!(header_str(&response, "X-RateLimit-Remaining"), Some("19"));
    }

    #[tokio::test]
    async fn test_missing_client_address_is_bad_request() {
        let app = router(state_with(
            Arc::new(InMemoryEngine::new()),
            FailureStrategy::FailOpen,
        ));

        let response = app.oneshot(request("/", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fail_open_outage_marks_responses_degraded() {
        let app = router(state_with(
            Arc::new(UnavailableEngine),
            FailureStrategy::FailOpen,
        ));

        let response = app
            .clone()
            .oneshot(request("/", None, Some("10.0.0.1:4242")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "X-RateLimit-Degraded"), Some("true"));
        // Remaining is unknown while the fallback decides.
        assert!(response.headers().get("X-RateLimit-Remaining").is_none());
    }

    #[tokio::test]
    async fn test_fail_closed_outage_denies_with_429() {
        let app = router(state_with(
            Arc::new(UnavailableEngine),
            FailureStrategy::FailClosed,
        ));

        let response = app
            .oneshot(request("/", None, Some("10.0.0.1:4242")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "rate limiter unavailable");
    }

    #[tokio::test]
    async fn test_health_and_metrics_bypass_admission_control() {
        // Even with the store down and fail-closed, the operational
        // endpoints answer.
        let app = router(state_with(
            Arc::new(UnavailableEngine),
            FailureStrategy::FailClosed,
        ));

        let response = app
            .clone()
            .oneshot(request("/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(request("/metrics", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("rate_limit_allowed_total"));
    }
}
