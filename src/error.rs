//! Unified error handling for egress-rotator.
//!
//! Every external collaborator returns one of these typed errors. Call sites
//! decide explicitly whether to log and continue or to propagate; only
//! [`RotationError`] ever reaches an HTTP caller.

use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Command Errors (firewall and VPN invocations)
// ============================================================================

/// Failure of an external command (firewall rule change, VPN connect/disconnect).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command template is empty")]
    Empty,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} timed out after {after:?}")]
    TimedOut { program: String, after: Duration },
}

impl CommandError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Empty => "empty_command",
            Self::Spawn { .. } => "spawn_failed",
            Self::Failed { .. } => "exit_status",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

// ============================================================================
// Resolver Errors (egress IP lookup)
// ============================================================================

/// Why a single trace lookup attempt did not yield an acceptable address.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("trace request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("trace endpoint returned HTTP {0}")]
    Status(u16),

    #[error("trace response has no valid ip= line")]
    MissingIp,

    #[error("resolved {0}, but IPv4 is preferred")]
    Ipv6NotPreferred(IpAddr),
}

/// The resolver gave up: every attempt failed or was unacceptable.
#[derive(Debug, Error)]
#[error("egress IP not found after {attempts} attempt(s): {last}")]
pub struct ResolveError {
    pub attempts: u32,
    #[source]
    pub last: LookupError,
}

// ============================================================================
// Store Errors (blacklist persistence)
// ============================================================================

/// Blacklist persistence errors. The in-memory store stays authoritative.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blacklist file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("blacklist serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Serialize(_) => "serialize",
        }
    }
}

// ============================================================================
// Rotation Errors (surfaced to HTTP callers)
// ============================================================================

/// A rotation failed in the VPN cycle. The only error class surfaced to callers.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("VPN disconnect failed: {0}")]
    Disconnect(#[source] CommandError),

    #[error("VPN connect failed: {0}")]
    Connect(#[source] CommandError),
}

impl RotationError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Disconnect(_) => "vpn_disconnect",
            Self::Connect(_) => "vpn_connect",
        }
    }
}
