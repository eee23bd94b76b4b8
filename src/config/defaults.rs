//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use crate::exec::CommandSpec;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

pub fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

// =============================================================================
// Blacklist Defaults
// =============================================================================

pub fn default_blacklist_path() -> PathBuf {
    PathBuf::from("/var/lib/cloudflare-warp/blacklist.json")
}

pub fn default_blacklist_ttl() -> u64 {
    24 * 3600
}

pub fn default_reap_interval() -> u64 {
    300
}

// =============================================================================
// Resolver Defaults
// =============================================================================

pub fn default_trace_url() -> String {
    "https://cloudflare.com/cdn-cgi/trace".to_string()
}

pub fn default_resolver_timeout() -> u64 {
    10
}

pub fn default_resolver_attempts() -> u32 {
    3
}

pub fn default_resolver_retry_delay() -> u64 {
    1000
}

// =============================================================================
// VPN Defaults
// =============================================================================

pub fn default_vpn_disconnect() -> CommandSpec {
    CommandSpec::new(["warp-cli", "disconnect"])
}

pub fn default_vpn_connect() -> CommandSpec {
    CommandSpec::new(["warp-cli", "connect"])
}

pub fn default_settle_delay() -> u64 {
    1000
}

// =============================================================================
// Firewall Defaults
// =============================================================================

pub fn default_firewall_block() -> CommandSpec {
    CommandSpec::new(["sudo", "iptables", "-A", "OUTPUT", "-d", "{ip}", "-j", "DROP"])
}

pub fn default_firewall_check() -> CommandSpec {
    CommandSpec::new(["sudo", "iptables", "-C", "OUTPUT", "-d", "{ip}", "-j", "DROP"])
}

pub fn default_firewall_unblock() -> CommandSpec {
    CommandSpec::new(["sudo", "iptables", "-D", "OUTPUT", "-d", "{ip}", "-j", "DROP"])
}

// =============================================================================
// Rotation Defaults
// =============================================================================

pub fn default_poll_attempts() -> u32 {
    5
}

pub fn default_poll_interval() -> u64 {
    1000
}
