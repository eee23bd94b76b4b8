//! Blacklist reaper background task.
//!
//! Periodically removes expired blacklist entries and lifts their firewall
//! rules. Runs until the shutdown token is cancelled; a failing cycle is
//! logged and the loop keeps going.

use crate::blacklist::BlacklistStore;
use crate::firewall::{Firewall, unblock_logged};
use crate::telemetry::spans;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info};

pub struct Reaper {
    store: Arc<BlacklistStore>,
    firewall: Arc<dyn Firewall>,
    interval: Duration,
}

impl Reaper {
    pub fn new(store: Arc<BlacklistStore>, firewall: Arc<dyn Firewall>, interval: Duration) -> Self {
        Self {
            store,
            firewall,
            interval,
        }
    }

    /// Run one cycle against `now` and return the IPs that were removed.
    ///
    /// Every removed IP gets exactly one unblock attempt, whether or not
    /// earlier ones failed.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Vec<IpAddr> {
        async {
            let expired = self.store.remove_expired(now).log_failure("reap");
            if expired.is_empty() {
                debug!("No expired blacklist entries");
                return Vec::new();
            }

            let mut removed = Vec::with_capacity(expired.len());
            for entry in expired {
                unblock_logged(self.firewall.as_ref(), entry.ip).await;
                info!(ip = %entry.ip, expired_at = %entry.expires_at, "Removed IP from blacklist");
                removed.push(entry.ip);
            }

            crate::metrics::record_reaped(removed.len());
            removed
        }
        .instrument(spans::reaper_cycle())
        .await
    }

    /// Spawn the reaper loop.
    ///
    /// The first cycle runs immediately, which also cleans up entries that
    /// expired while the service was down.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "Blacklist reaper started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.run_cycle(Utc::now()).await;
                    }
                }
            }

            info!("Blacklist reaper stopped");
        })
    }
}
