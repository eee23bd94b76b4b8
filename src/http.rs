//! HTTP control API and Prometheus metrics endpoint.
//!
//! The control API serves `/rotate`, `/status` and `/clear-blacklist`, gated
//! by an optional API key. Metrics run on a separate listener so they can be
//! scraped without the key.

use crate::blacklist::{Applied, BlacklistStore};
use crate::firewall::{Firewall, unblock_logged};
use crate::resolver::EgressResolver;
use crate::rotation::Rotator;
use axum::extract::{Request, State};
use axum::http::header::InvalidHeaderName;
use axum::http::{HeaderName, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::SecondsFormat;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// API key check applied to every control request.
pub struct ApiKeyAuth {
    header: HeaderName,
    key: String,
}

impl ApiKeyAuth {
    pub fn new(header: &str, key: impl Into<String>) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::from_bytes(header.as_bytes())?,
            key: key.into(),
        })
    }

    /// Constant-time comparison against the configured key.
    fn accepts(&self, presented: &[u8]) -> bool {
        presented.ct_eq(self.key.as_bytes()).into()
    }
}

/// Shared state of the control API.
pub struct AppState {
    pub rotator: Arc<Rotator>,
    pub resolver: Arc<dyn EgressResolver>,
    pub firewall: Arc<dyn Firewall>,
    pub store: Arc<BlacklistStore>,
    /// `None` disables authentication.
    pub auth: Option<ApiKeyAuth>,
}

#[derive(Serialize)]
struct RotateResponse {
    success: bool,
    old_ip: Option<IpAddr>,
    new_ip: Option<IpAddr>,
}

#[derive(Serialize)]
struct StatusResponse {
    current_ip: Option<IpAddr>,
    blacklisted_ips: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    let body = ErrorResponse {
        success: false,
        error: error.into(),
    };
    (status, Json(body)).into_response()
}

/// Build the control API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rotate", post(rotate_handler))
        .route("/status", get(status_handler))
        .route("/clear-blacklist", post(clear_blacklist_handler))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), require_api_key))
        .with_state(state)
}

/// Reject requests without the configured API key before any handler runs.
async fn require_api_key(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let Some(auth) = &state.auth else {
        return next.run(request).await;
    };

    let presented = request.headers().get(&auth.header);
    let had_key = presented.is_some();
    let authorized = presented.is_some_and(|value| auth.accepts(value.as_bytes()));

    if !authorized {
        debug!(path = %request.uri().path(), had_key, "Rejected request without a valid API key");
        return failure(StatusCode::UNAUTHORIZED, "unauthorized");
    }
    next.run(request).await
}

/// POST /rotate
async fn rotate_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.rotator.rotate().await {
        Ok(outcome) => Json(RotateResponse {
            success: true,
            old_ip: outcome.old_ip,
            new_ip: outcome.new_ip,
        })
        .into_response(),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /status
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let current_ip = match state.resolver.resolve_current_ip().await {
        Ok(ip) => Some(ip),
        Err(e) => {
            warn!(error = %e, "Status requested but current egress IP is unknown");
            None
        }
    };

    let blacklisted_ips = state
        .store
        .snapshot()
        .into_iter()
        .map(|(ip, expires_at)| {
            (
                ip.to_string(),
                expires_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            )
        })
        .collect();

    Json(StatusResponse {
        current_ip,
        blacklisted_ips,
    })
}

/// POST /clear-blacklist
async fn clear_blacklist_handler(State(state): State<Arc<AppState>>) -> Response {
    let Applied {
        value: removed,
        persisted,
    } = state.store.clear_all();

    for ip in &removed {
        unblock_logged(state.firewall.as_ref(), *ip).await;
    }
    info!(count = removed.len(), "Blacklist cleared");

    match persisted {
        Ok(()) => Json(SuccessResponse { success: true }).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to persist cleared blacklist");
            crate::metrics::record_persist_failure(e.error_code());
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Serve the control API until `shutdown` is cancelled, then drain.
pub async fn serve(listener: TcpListener, state: Arc<AppState>, shutdown: CancellationToken) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Control API listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `0.0.0.0:port` and serves `/metrics` until `shutdown` fires.
/// Failures are logged; the rest of the service keeps running.
pub async fn run_metrics_server(port: u16, shutdown: CancellationToken) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    info!(addr = %addr, "Prometheus HTTP server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        error!(error = %e, "Metrics server error");
    }
}
