//! Prometheus metrics collection for egress-rotator.
//!
//! Metrics are exposed on a separate HTTP listener (see [`crate::http`]).
//! Every recording helper is a no-op until [`init`] has run, so library code
//! and tests can call them unconditionally.
//!
//! - `rotator_rotations_total` - Rotations attempted
//! - `rotator_rotation_failures_total{error}` - Rotations that failed in the VPN cycle
//! - `rotator_rotation_duration_seconds` - End-to-end rotation latency
//! - `rotator_blacklist_size` - Entries currently blacklisted
//! - `rotator_reaped_total` - Entries removed by the reaper
//! - `rotator_firewall_errors_total{action}` - Failed firewall commands
//! - `rotator_resolve_failures_total` - Egress IP lookups that gave up
//! - `rotator_persist_failures_total{error}` - Failed blacklist writes

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

pub static ROTATIONS: OnceLock<IntCounter> = OnceLock::new();

pub static ROTATION_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

pub static REAPED: OnceLock<IntCounter> = OnceLock::new();

pub static FIREWALL_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

pub static RESOLVE_FAILURES: OnceLock<IntCounter> = OnceLock::new();

pub static PERSIST_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges and histograms
// ========================================================================

pub static BLACKLIST_SIZE: OnceLock<IntGauge> = OnceLock::new();

pub static ROTATION_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(ROTATIONS, IntCounter::new("rotator_rotations_total", "Rotations attempted"));
    register!(ROTATION_FAILURES, IntCounterVec::new(Opts::new("rotator_rotation_failures_total", "Rotations failed in the VPN cycle"), &["error"]));
    register!(REAPED, IntCounter::new("rotator_reaped_total", "Blacklist entries removed on expiry"));
    register!(FIREWALL_ERRORS, IntCounterVec::new(Opts::new("rotator_firewall_errors_total", "Failed firewall commands"), &["action"]));
    register!(RESOLVE_FAILURES, IntCounter::new("rotator_resolve_failures_total", "Egress IP lookups that gave up"));
    register!(PERSIST_FAILURES, IntCounterVec::new(Opts::new("rotator_persist_failures_total", "Failed blacklist writes"), &["error"]));
    register!(BLACKLIST_SIZE, IntGauge::new("rotator_blacklist_size", "Entries currently blacklisted"));
    register!(ROTATION_LATENCY, Histogram::with_opts(
        HistogramOpts::new("rotator_rotation_duration_seconds", "End-to-end rotation latency")
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

/// Record a finished rotation with latency and, when it failed, its error code.
#[inline]
pub fn record_rotation(duration_secs: f64, error: Option<&str>) {
    if let Some(c) = ROTATIONS.get() {
        c.inc();
    }
    if let Some(h) = ROTATION_LATENCY.get() {
        h.observe(duration_secs);
    }
    if let Some(code) = error
        && let Some(c) = ROTATION_FAILURES.get()
    {
        c.with_label_values(&[code]).inc();
    }
}

#[inline]
pub fn record_reaped(count: usize) {
    if let Some(c) = REAPED.get() {
        c.inc_by(count as u64);
    }
}

/// Record a failed firewall command (`action` is "block" or "unblock").
#[inline]
pub fn record_firewall_error(action: &str) {
    if let Some(c) = FIREWALL_ERRORS.get() {
        c.with_label_values(&[action]).inc();
    }
}

#[inline]
pub fn record_resolve_failure() {
    if let Some(c) = RESOLVE_FAILURES.get() {
        c.inc();
    }
}

#[inline]
pub fn record_persist_failure(error: &str) {
    if let Some(c) = PERSIST_FAILURES.get() {
        c.with_label_values(&[error]).inc();
    }
}

#[inline]
pub fn set_blacklist_size(size: usize) {
    if let Some(g) = BLACKLIST_SIZE.get() {
        g.set(size as i64);
    }
}
