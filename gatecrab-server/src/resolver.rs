//! Identity classification: which bucket a request draws from and under
//! which policy.
//!
//! This is a pure function of the request attributes. A recognized bearer
//! credential wins over the client IP; keys are namespaced by class prefix
//! so a user id can never collide with an IP address.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use gatecrab::RateLimitPolicy;
use thiserror::Error;

const BEARER_PREFIX: &str = "Bearer ";

/// The two identity classes the limiter distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityClass {
    User,
    Ip,
}

impl IdentityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityClass::User => "user",
            IdentityClass::Ip => "ip",
        }
    }
}

/// Static policy table: one policy per identity class.
#[derive(Debug, Clone, Copy)]
pub struct PolicySet {
    pub anonymous: RateLimitPolicy,
    pub user: RateLimitPolicy,
}

/// A classified request: the bucket key, the class it belongs to, and the
/// policy that applies.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub key: String,
    pub class: IdentityClass,
    pub policy: RateLimitPolicy,
}

/// Resolver failures, surfaced to the caller as a request rejection
/// distinct from a rate limit denial. No fallback is attempted.
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    /// The transport-level client address could not be parsed.
    #[error("invalid client address")]
    InvalidClientAddress,
}

/// Classify a request from its `Authorization` header and transport-level
/// client address.
///
/// The client address is validated first even for authenticated requests; a
/// request whose transport address cannot be parsed is malformed regardless
/// of its credentials.
pub fn resolve(
    authorization: Option<&str>,
    remote_addr: Option<&str>,
    policies: &PolicySet,
) -> Result<ResolvedIdentity, ResolveError> {
    let addr: SocketAddr = remote_addr
        .ok_or(ResolveError::InvalidClientAddress)?
        .parse()
        .map_err(|_| ResolveError::InvalidClientAddress)?;

    if let Some(user_id) = authorization.and_then(extract_user_id) {
        return Ok(ResolvedIdentity {
            key: format!("user:{user_id}"),
            class: IdentityClass::User,
            policy: policies.user,
        });
    }

    Ok(ResolvedIdentity {
        key: format!("ip:{}", normalize_ip(addr.ip())),
        class: IdentityClass::Ip,
        policy: policies.anonymous,
    })
}

/// Pull the identifier out of a `Bearer <id>` header. An empty identifier
/// does not count as a credential.
fn extract_user_id(header: &str) -> Option<&str> {
    let id = header.strip_prefix(BEARER_PREFIX)?.trim();
    if id.is_empty() { None } else { Some(id) }
}

/// Canonicalize loopback and IPv4-mapped addresses to their IPv4 spelling
/// so `::1` and `127.0.0.1` share one bucket.
fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) if v6.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 @ IpAddr::V4(_) => v4,
    }
}
