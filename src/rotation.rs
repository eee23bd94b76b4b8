//! Egress IP rotation.
//!
//! A rotation blacklists the current egress IP, cycles the VPN connection and
//! polls until a different address shows up. Only a VPN failure fails the
//! rotation; problems resolving or blacklisting the old IP are logged and
//! the cycle goes ahead.

use crate::blacklist::BlacklistStore;
use crate::config::Config;
use crate::error::RotationError;
use crate::firewall::Firewall;
use crate::resolver::EgressResolver;
use crate::telemetry::{RotationTimer, spans};
use crate::vpn::VpnClient;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

/// Result of a successful rotation. Either address may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationOutcome {
    pub old_ip: Option<IpAddr>,
    pub new_ip: Option<IpAddr>,
}

/// Timing knobs for a rotation.
#[derive(Debug, Clone, Copy)]
pub struct RotationSettings {
    /// How long the old IP stays blacklisted.
    pub ttl: Duration,
    /// Pause between VPN disconnect and connect.
    pub settle_delay: Duration,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

impl RotationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: config.blacklist.ttl(),
            settle_delay: config.vpn.settle_delay(),
            poll_attempts: config.rotation.poll_attempts.max(1),
            poll_interval: config.rotation.poll_interval(),
        }
    }
}

/// Drives rotations. Concurrent callers are served one at a time.
pub struct Rotator {
    resolver: Arc<dyn EgressResolver>,
    firewall: Arc<dyn Firewall>,
    vpn: Arc<dyn VpnClient>,
    store: Arc<BlacklistStore>,
    settings: RotationSettings,
    /// Held for a whole rotation so VPN cycles never interleave.
    in_progress: Mutex<()>,
}

impl Rotator {
    pub fn new(
        resolver: Arc<dyn EgressResolver>,
        firewall: Arc<dyn Firewall>,
        vpn: Arc<dyn VpnClient>,
        store: Arc<BlacklistStore>,
        settings: RotationSettings,
    ) -> Self {
        Self {
            resolver,
            firewall,
            vpn,
            store,
            settings,
            in_progress: Mutex::new(()),
        }
    }

    /// Rotate the egress IP.
    pub async fn rotate(&self) -> Result<RotationOutcome, RotationError> {
        let _guard = self.in_progress.lock().await;

        let id = Uuid::new_v4();
        let mut timer = RotationTimer::new();
        let result = self.rotate_locked().instrument(spans::rotation(&id)).await;
        if let Err(e) = &result {
            timer.fail(e.error_code());
        }
        result
    }

    async fn rotate_locked(&self) -> Result<RotationOutcome, RotationError> {
        info!("Starting rotation");

        let old_ip = match self.resolver.resolve_current_ip().await {
            Ok(ip) => Some(ip),
            Err(e) => {
                warn!(error = %e, "Current egress IP unknown, rotating without blacklisting");
                None
            }
        };

        if let Some(ip) = old_ip {
            self.blacklist(ip).await;
        }

        if let Err(e) = self.vpn.disconnect().await {
            let err = RotationError::Disconnect(e);
            warn!(error = %err, "Rotation failed");
            return Err(err);
        }
        tokio::time::sleep(self.settings.settle_delay).await;
        if let Err(e) = self.vpn.connect().await {
            let err = RotationError::Connect(e);
            warn!(error = %err, "Rotation failed");
            return Err(err);
        }

        let new_ip = self.poll_new_ip(old_ip).await;
        info!(old_ip = ?old_ip, new_ip = ?new_ip, "Rotation complete");

        Ok(RotationOutcome { old_ip, new_ip })
    }

    /// Block `ip` and record it with a fresh expiry.
    ///
    /// The block runs even for an IP already in the store: its rule may have
    /// failed earlier or been flushed since.
    async fn blacklist(&self, ip: IpAddr) {
        if let Err(e) = self.firewall.block(ip).await {
            warn!(ip = %ip, code = e.error_code(), error = %e, "Failed to add firewall rule, blacklisting anyway");
            crate::metrics::record_firewall_error("block");
        }

        let expires_at = self.store.put(ip, self.settings.ttl).log_failure("blacklist");
        info!(ip = %ip, expires_at = %expires_at, "Blacklisted old egress IP");
    }

    /// Resolve until the address differs from `old_ip` or attempts run out.
    /// Returns the last lookup's answer.
    async fn poll_new_ip(&self, old_ip: Option<IpAddr>) -> Option<IpAddr> {
        let attempts = self.settings.poll_attempts;
        let mut last = None;

        for attempt in 1..=attempts {
            last = match self.resolver.resolve_current_ip().await {
                Ok(ip) if Some(ip) != old_ip => return Some(ip),
                Ok(ip) => {
                    debug!(attempt, ip = %ip, "Egress IP unchanged");
                    Some(ip)
                }
                Err(e) => {
                    debug!(attempt, error = %e, "New egress IP not resolvable yet");
                    None
                }
            };
            if attempt < attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }

        warn!(attempts, "Egress IP did not change after reconnect");
        last
    }
}
