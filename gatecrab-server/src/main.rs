use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use tracing_subscriber::EnvFilter;

use gatecrab_server::config::Config;
use gatecrab_server::engine::RedisEngine;
use gatecrab_server::facade::RateLimitFacade;
use gatecrab_server::metrics::Metrics;
use gatecrab_server::middleware::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env_and_args()?;

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("gatecrab={}", config.log_level).parse()?)
        .add_directive(format!("gatecrab_server={}", config.log_level).parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let script_source = std::fs::read_to_string(&config.script_path)
        .with_context(|| format!("reading lua script {}", config.script_path.display()))?;

    // Store connectivity at startup is a hard requirement; a service that
    // boots straight into degraded mode hides misconfiguration.
    let client = redis::Client::open(config.redis_url.as_str())
        .with_context(|| format!("parsing redis url {}", config.redis_url))?;
    let conn = ConnectionManager::new(client)
        .await
        .context("connecting to redis")?;
    tracing::info!(url = %config.redis_url, "connected to redis");

    let metrics = Arc::new(Metrics::new());
    let engine = Arc::new(RedisEngine::new(conn, &script_source));
    let facade = RateLimitFacade::new(
        engine,
        config.policies.anonymous,
        config.failure_strategy,
        config.engine_timeout,
        metrics.clone(),
    );
    let state = Arc::new(AppState {
        facade,
        policies: config.policies,
        metrics,
    });

    let addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(
        %addr,
        strategy = %config.failure_strategy,
        "gatecrab admission layer listening"
    );

    axum::serve(
        listener,
        middleware::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("http server error")?;

    Ok(())
}
