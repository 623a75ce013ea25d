//! Server configuration from CLI flags and environment variables.
//!
//! Every flag has a `GATECRAB_`-prefixed environment variable twin; CLI
//! flags win when both are set.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use gatecrab::RateLimitPolicy;

use crate::facade::FailureStrategy;
use crate::resolver::PolicySet;

#[derive(Parser, Debug)]
#[command(name = "gatecrab")]
#[command(about = "Rate-limiting admission layer backed by a shared store")]
#[command(version)]
pub struct Args {
    /// HTTP listen host
    #[arg(long, env = "GATECRAB_HTTP_HOST", default_value = "127.0.0.1")]
    pub http_host: String,

    /// HTTP listen port
    #[arg(long, env = "GATECRAB_HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Redis connection URL
    #[arg(
        long,
        env = "GATECRAB_REDIS_URL",
        default_value = "redis://127.0.0.1:6379"
    )]
    pub redis_url: String,

    /// Path to the token bucket Lua script
    #[arg(
        long,
        env = "GATECRAB_SCRIPT_PATH",
        default_value = "scripts/token_bucket.lua"
    )]
    pub script_path: PathBuf,

    /// Bucket capacity for anonymous (per-IP) clients
    #[arg(long, env = "GATECRAB_ANON_CAPACITY", default_value_t = 5.0)]
    pub anon_capacity: f64,

    /// Refill rate in tokens per second for anonymous clients
    #[arg(long, env = "GATECRAB_ANON_REFILL_RATE", default_value_t = 1.0)]
    pub anon_refill_rate: f64,

    /// Bucket capacity for authenticated users
    #[arg(long, env = "GATECRAB_USER_CAPACITY", default_value_t = 20.0)]
    pub user_capacity: f64,

    /// Refill rate in tokens per second for authenticated users
    #[arg(long, env = "GATECRAB_USER_REFILL_RATE", default_value_t = 5.0)]
    pub user_refill_rate: f64,

    /// What to do when the store is unreachable (fail-open, fail-closed)
    #[arg(long, env = "GATECRAB_FAILURE_STRATEGY", default_value = "fail-open")]
    pub failure_strategy: String,

    /// Upper bound on a single store evaluation, in milliseconds
    #[arg(long, env = "GATECRAB_ENGINE_TIMEOUT_MS", default_value_t = 100)]
    pub engine_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GATECRAB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// List all environment variables and exit
    #[arg(long)]
    pub list_env_vars: bool,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_host: String,
    pub http_port: u16,
    pub redis_url: String,
    pub script_path: PathBuf,
    pub policies: PolicySet,
    pub failure_strategy: FailureStrategy,
    pub engine_timeout: Duration,
    pub log_level: String,
}

impl Config {
    /// Parse configuration from CLI arguments and environment variables.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Validate parsed arguments into a runtime configuration.
    pub fn from_args(args: Args) -> Result<Self> {
        let anonymous = RateLimitPolicy::new(args.anon_capacity, args.anon_refill_rate)
            .context("invalid anonymous rate limit policy")?;
        let user = RateLimitPolicy::new(args.user_capacity, args.user_refill_rate)
            .context("invalid user rate limit policy")?;

        if args.engine_timeout_ms == 0 {
            bail!("engine timeout must be at least 1ms");
        }

        Ok(Config {
            http_host: args.http_host,
            http_port: args.http_port,
            redis_url: args.redis_url,
            script_path: args.script_path,
            policies: PolicySet { anonymous, user },
            failure_strategy: FailureStrategy::parse_lossy(&args.failure_strategy),
            engine_timeout: Duration::from_millis(args.engine_timeout_ms),
            log_level: args.log_level,
        })
    }
}

/// Print all environment variables in a format suitable for documentation.
fn print_env_vars() {
    println!("Gatecrab environment variables:");
    println!();
    println!("  GATECRAB_HTTP_HOST          HTTP listen host (default: 127.0.0.1)");
    println!("  GATECRAB_HTTP_PORT          HTTP listen port (default: 8080)");
    println!("  GATECRAB_REDIS_URL          Redis connection URL (default: redis://127.0.0.1:6379)");
    println!("  GATECRAB_SCRIPT_PATH        Token bucket Lua script (default: scripts/token_bucket.lua)");
    println!("  GATECRAB_ANON_CAPACITY      Anonymous bucket capacity (default: 5)");
    println!("  GATECRAB_ANON_REFILL_RATE   Anonymous refill tokens/sec (default: 1)");
    println!("  GATECRAB_USER_CAPACITY      User bucket capacity (default: 20)");
    println!("  GATECRAB_USER_REFILL_RATE   User refill tokens/sec (default: 5)");
    println!("  GATECRAB_FAILURE_STRATEGY   fail-open or fail-closed (default: fail-open)");
    println!("  GATECRAB_ENGINE_TIMEOUT_MS  Store evaluation timeout (default: 100)");
    println!("  GATECRAB_LOG_LEVEL          Log level (default: info)");
}
