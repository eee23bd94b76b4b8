//! Telemetry utilities for rotation timing and tracing spans.

use std::time::Instant;

/// Guard for timing a rotation and recording metrics.
///
/// Records latency when dropped. Call [`RotationTimer::fail`] before the
/// guard drops to label the rotation as failed.
pub struct RotationTimer {
    start: Instant,
    error: Option<&'static str>,
}

impl RotationTimer {
    /// Start timing a rotation.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            error: None,
        }
    }

    /// Mark the rotation as failed with a static error code.
    pub fn fail(&mut self, error_code: &'static str) {
        self.error = Some(error_code);
    }
}

impl Default for RotationTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RotationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_rotation(duration, self.error);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for one rotation.
    pub fn rotation(id: &uuid::Uuid) -> Span {
        info_span!("rotation", id = %id)
    }

    /// Create a span for one reaper cycle.
    pub fn reaper_cycle() -> Span {
        info_span!("reaper_cycle")
    }
}
