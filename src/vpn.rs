//! VPN client adapter (Cloudflare WARP via `warp-cli` by default).

use crate::config::VpnConfig;
use crate::error::CommandError;
use crate::exec::CommandSpec;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Connects and disconnects the VPN tunnel that owns the egress IP.
#[async_trait]
pub trait VpnClient: Send + Sync {
    async fn disconnect(&self) -> Result<(), CommandError>;

    async fn connect(&self) -> Result<(), CommandError>;
}

/// VPN client driven by configurable external commands.
pub struct CommandVpn {
    disconnect: CommandSpec,
    connect: CommandSpec,
    timeout: Option<Duration>,
}

impl CommandVpn {
    pub fn new(config: &VpnConfig) -> Self {
        Self {
            disconnect: config.disconnect.clone(),
            connect: config.connect.clone(),
            timeout: config.command_timeout(),
        }
    }
}

#[async_trait]
impl VpnClient for CommandVpn {
    async fn disconnect(&self) -> Result<(), CommandError> {
        self.disconnect.run(None, self.timeout).await?;
        info!(program = %self.disconnect.program(), "VPN disconnected");
        Ok(())
    }

    async fn connect(&self) -> Result<(), CommandError> {
        self.connect.run(None, self.timeout).await?;
        info!(program = %self.connect.program(), "VPN connected");
        Ok(())
    }
}
