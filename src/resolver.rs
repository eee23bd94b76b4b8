//! Egress IP resolution via a trace endpoint.
//!
//! The endpoint (Cloudflare's `/cdn-cgi/trace` by default) answers with
//! `key=value` lines, one of which is `ip=<address>`. The current egress IP
//! is never cached: the VPN client may change it at any time.

use crate::config::ResolverConfig;
use crate::error::{LookupError, ResolveError};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

/// Determines the address external services currently see for this host.
#[async_trait]
pub trait EgressResolver: Send + Sync {
    async fn resolve_current_ip(&self) -> Result<IpAddr, ResolveError>;
}

/// Resolver backed by an HTTP trace endpoint, with retry and an
/// address-family preference.
pub struct TraceResolver {
    /// HTTP client with the per-request timeout applied.
    http_client: reqwest::Client,
    trace_url: String,
    /// An IPv6 answer counts as a failed attempt when set.
    prefer_ipv4: bool,
    attempts: u32,
    retry_delay: Duration,
}

impl TraceResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("egress-rotator/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            trace_url: config.trace_url.clone(),
            prefer_ipv4: config.prefer_ipv4,
            attempts: config.attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    /// One request to the trace endpoint.
    async fn lookup_once(&self) -> Result<IpAddr, LookupError> {
        let response = self.http_client.get(&self.trace_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let ip = parse_trace(&body).ok_or(LookupError::MissingIp)?;

        if self.prefer_ipv4 && ip.is_ipv6() {
            return Err(LookupError::Ipv6NotPreferred(ip));
        }
        Ok(ip)
    }
}

#[async_trait]
impl EgressResolver for TraceResolver {
    async fn resolve_current_ip(&self) -> Result<IpAddr, ResolveError> {
        let mut attempt = 1;
        loop {
            match self.lookup_once().await {
                Ok(ip) => {
                    debug!(ip = %ip, attempt, "Resolved egress IP");
                    return Ok(ip);
                }
                Err(e) if attempt >= self.attempts => {
                    warn!(attempts = self.attempts, error = %e, "Giving up on egress IP lookup");
                    crate::metrics::record_resolve_failure();
                    return Err(ResolveError {
                        attempts: self.attempts,
                        last: e,
                    });
                }
                Err(e) => {
                    warn!(attempt, attempts = self.attempts, error = %e, "Egress IP lookup attempt failed, retrying");
                }
            }
            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

/// Extract the address from a trace body's `ip=` line.
pub fn parse_trace(body: &str) -> Option<IpAddr> {
    body.lines()
        .find_map(|line| line.trim().strip_prefix("ip="))
        .and_then(|value| value.trim().parse().ok())
}
