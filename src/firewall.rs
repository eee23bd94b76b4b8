//! Firewall adapter: one outbound drop rule per blacklisted IP.
//!
//! Both operations run external commands. Failures come back as
//! [`CommandError`] values; no caller rolls back other state because of them.
//! `block` is idempotent when a check command is configured: a rule that is
//! already present is not added again.

use crate::config::FirewallConfig;
use crate::error::CommandError;
use crate::exec::CommandSpec;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Applies and removes "drop outbound traffic to IP" rules.
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Ensure the drop rule for `ip` is present.
    async fn block(&self, ip: IpAddr) -> Result<(), CommandError>;

    /// Remove the drop rule for `ip`.
    async fn unblock(&self, ip: IpAddr) -> Result<(), CommandError>;
}

/// Firewall driven by configurable external commands (iptables by default).
pub struct CommandFirewall {
    block: CommandSpec,
    check: CommandSpec,
    unblock: CommandSpec,
    timeout: Option<Duration>,
}

impl CommandFirewall {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            block: config.block.clone(),
            check: config.check.clone(),
            unblock: config.unblock.clone(),
            timeout: config.command_timeout(),
        }
    }
}

#[async_trait]
impl Firewall for CommandFirewall {
    async fn block(&self, ip: IpAddr) -> Result<(), CommandError> {
        // A failing check means "absent" as far as we can tell; add the rule.
        if !self.check.is_empty() && self.check.run(Some(ip), self.timeout).await.is_ok() {
            debug!(ip = %ip, "Firewall drop rule already present");
            return Ok(());
        }
        self.block.run(Some(ip), self.timeout).await?;
        info!(ip = %ip, "Firewall drop rule added");
        Ok(())
    }

    async fn unblock(&self, ip: IpAddr) -> Result<(), CommandError> {
        self.unblock.run(Some(ip), self.timeout).await?;
        info!(ip = %ip, "Firewall drop rule removed");
        Ok(())
    }
}

/// Remove the rule for `ip`, logging instead of propagating a failure.
///
/// Returns whether the command succeeded.
pub async fn unblock_logged(firewall: &dyn Firewall, ip: IpAddr) -> bool {
    match firewall.unblock(ip).await {
        Ok(()) => true,
        Err(e) => {
            warn!(ip = %ip, code = e.error_code(), error = %e, "Failed to remove firewall rule");
            crate::metrics::record_firewall_error("unblock");
            false
        }
    }
}
