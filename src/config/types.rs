//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;
use crate::exec::CommandSpec;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listener and authentication.
    #[serde(default)]
    pub server: ServerConfig,
    /// Blacklist persistence and expiry.
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    /// Egress IP trace lookups.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// VPN client commands.
    #[serde(default)]
    pub vpn: VpnConfig,
    /// Firewall rule commands.
    #[serde(default)]
    pub firewall: FirewallConfig,
    /// New-IP polling after reconnect.
    #[serde(default)]
    pub rotation: RotationConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Control API listen address (default: 0.0.0.0:8080).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Shared secret required on every request. Unset disables auth.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Header carrying the API key (default: X-API-Key).
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
}

impl ServerConfig {
    pub fn metrics_port(&self) -> u16 {
        self.metrics_port.unwrap_or(9090)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            api_key: None,
            api_key_header: default_api_key_header(),
            metrics_port: None,
        }
    }
}

/// Blacklist configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BlacklistConfig {
    /// JSON file holding `ip -> expiry` (survives restarts).
    #[serde(default = "default_blacklist_path")]
    pub path: PathBuf,
    /// How long a rotated-away IP stays blacklisted, in seconds (default: 24h).
    #[serde(default = "default_blacklist_ttl")]
    pub ttl_secs: u64,
    /// Seconds between reaper cycles (default: 300).
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

impl BlacklistConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            path: default_blacklist_path(),
            ttl_secs: default_blacklist_ttl(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

/// Egress IP resolver configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Trace endpoint answering with an `ip=<addr>` line.
    #[serde(default = "default_trace_url")]
    pub trace_url: String,
    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_resolver_timeout")]
    pub timeout_secs: u64,
    /// Treat an IPv6 answer as unacceptable and retry (default: true).
    #[serde(default = "default_true")]
    pub prefer_ipv4: bool,
    /// Total lookup attempts, including the first (default: 3).
    #[serde(default = "default_resolver_attempts")]
    pub attempts: u32,
    /// Pause between attempts in milliseconds (default: 1000).
    #[serde(default = "default_resolver_retry_delay")]
    pub retry_delay_ms: u64,
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            trace_url: default_trace_url(),
            timeout_secs: default_resolver_timeout(),
            prefer_ipv4: true,
            attempts: default_resolver_attempts(),
            retry_delay_ms: default_resolver_retry_delay(),
        }
    }
}

/// VPN client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VpnConfig {
    #[serde(default = "default_vpn_disconnect")]
    pub disconnect: CommandSpec,
    #[serde(default = "default_vpn_connect")]
    pub connect: CommandSpec,
    /// Pause between disconnect and connect in milliseconds (default: 1000).
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    /// Kill a VPN command after this many seconds. Unset waits forever.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl VpnConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            disconnect: default_vpn_disconnect(),
            connect: default_vpn_connect(),
            settle_delay_ms: default_settle_delay(),
            command_timeout_secs: None,
        }
    }
}

/// Firewall configuration. `{ip}` in any argument is replaced by the target.
#[derive(Debug, Clone, Deserialize)]
pub struct FirewallConfig {
    #[serde(default = "default_firewall_block")]
    pub block: CommandSpec,
    /// Exits 0 when the rule for `{ip}` is already present, so `block`
    /// does not add a duplicate. Empty disables the check.
    #[serde(default = "default_firewall_check")]
    pub check: CommandSpec,
    #[serde(default = "default_firewall_unblock")]
    pub unblock: CommandSpec,
    /// Kill a firewall command after this many seconds. Unset waits forever.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl FirewallConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            block: default_firewall_block(),
            check: default_firewall_check(),
            unblock: default_firewall_unblock(),
            command_timeout_secs: None,
        }
    }
}

/// Post-reconnect polling for the new egress IP.
#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    /// Resolution attempts after reconnecting (default: 5).
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// Pause between attempts in milliseconds (default: 1000).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl RotationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}
