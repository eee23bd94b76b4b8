//! Type definitions for the blacklist store.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use tracing::error;

/// A blacklisted address and the moment it may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub ip: IpAddr,
    pub expires_at: DateTime<Utc>,
}

impl BlacklistEntry {
    /// An entry expires once `now` reaches its expiry.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of a store mutation.
///
/// The in-memory change always happens; `persisted` reports whether the file
/// write that followed it succeeded.
#[derive(Debug)]
#[must_use]
pub struct Applied<T> {
    pub value: T,
    pub persisted: Result<(), StoreError>,
}

impl<T> Applied<T> {
    /// Log a persistence failure and keep going with the value.
    pub fn log_failure(self, operation: &'static str) -> T {
        if let Err(e) = &self.persisted {
            error!(operation, error = %e, "Failed to persist blacklist, in-memory state kept");
            crate::metrics::record_persist_failure(e.error_code());
        }
        self.value
    }
}
