//! egress-rotator - egress IP rotation service
//!
//! Rotates this host's egress IP through a VPN client and keeps recently used
//! addresses blacklisted (and firewalled) for a while.

mod blacklist;
mod config;
mod error;
mod exec;
mod firewall;
mod http;
mod metrics;
mod reaper;
mod resolver;
mod rotation;
mod shutdown;
mod telemetry;
#[cfg(test)]
mod testing;
mod vpn;

use crate::blacklist::BlacklistStore;
use crate::config::Config;
use crate::firewall::{CommandFirewall, Firewall};
use crate::http::{ApiKeyAuth, AppState};
use crate::reaper::Reaper;
use crate::resolver::{EgressResolver, TraceResolver};
use crate::rotation::{RotationSettings, Rotator};
use crate::vpn::{CommandVpn, VpnClient};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration: file first (optional), then environment overrides
    let mut config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).map_err(|e| {
            error!(path = %path, error = %e, "Failed to load config");
            e
        })?,
        None => {
            info!("No config file given, using defaults");
            Config::default()
        }
    };
    config.apply_env().map_err(|e| {
        error!(error = %e, "Invalid environment override");
        e
    })?;

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    info!(
        listen = %config.server.listen,
        blacklist = %config.blacklist.path.display(),
        trace_url = %config.resolver.trace_url,
        "Starting egress-rotator"
    );

    let shutdown = shutdown::create_shutdown_token();

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port();
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        let token = shutdown.clone();
        tokio::spawn(async move {
            http::run_metrics_server(metrics_port, token).await;
        });
    }

    let auth = match &config.server.api_key {
        Some(key) => Some(ApiKeyAuth::new(&config.server.api_key_header, key.clone())?),
        None => {
            warn!("No API key configured, control API is unauthenticated");
            None
        }
    };

    let store = Arc::new(BlacklistStore::load(&config.blacklist.path));
    let resolver: Arc<dyn EgressResolver> = Arc::new(TraceResolver::new(&config.resolver));
    let firewall: Arc<dyn Firewall> = Arc::new(CommandFirewall::new(&config.firewall));
    let vpn: Arc<dyn VpnClient> = Arc::new(CommandVpn::new(&config.vpn));

    let rotator = Arc::new(Rotator::new(
        Arc::clone(&resolver),
        Arc::clone(&firewall),
        vpn,
        Arc::clone(&store),
        RotationSettings::from_config(&config),
    ));

    // Start blacklist reaper
    let reaper = Reaper::new(
        Arc::clone(&store),
        Arc::clone(&firewall),
        config.blacklist.reap_interval(),
    )
    .spawn(shutdown.clone());

    let state = Arc::new(AppState {
        rotator,
        resolver,
        firewall,
        store: Arc::clone(&store),
        auth,
    });

    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .map_err(|e| {
            error!(addr = %config.server.listen, error = %e, "Failed to bind control API");
            e
        })?;

    let served = http::serve(listener, state, shutdown.clone()).await;

    // The server also stops on its own error; make sure the reaper follows.
    shutdown.cancel();
    if let Err(e) = reaper.await {
        warn!(error = %e, "Reaper task ended abnormally");
    }

    match store.save() {
        Ok(()) => info!(path = %store.path().display(), entries = store.len(), "Blacklist flushed"),
        Err(e) => error!(error = %e, "Failed to flush blacklist on shutdown"),
    }

    served?;
    info!("egress-rotator stopped");
    Ok(())
}
