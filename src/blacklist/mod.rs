//! Time-bounded blacklist of recently used egress IPs.
//!
//! # Architecture
//!
//! - **Map**: `BTreeMap<IpAddr, DateTime<Utc>>` (ip -> expiry)
//! - **Lock**: one `parking_lot::Mutex` serializes every read and write
//! - **Persistence**: JSON file, written while the lock is held, via temp
//!   file + rename
//!
//! Holding the lock across the file write means the file always reflects a
//! state that existed in memory, and a reaper cycle can never interleave with
//! a rotation's insert. Writes are small and infrequent (one per rotation,
//! one per reap that finds something), so blocking briefly is acceptable.
//!
//! Firewall rules are not touched here; callers keep them in step.

mod persistence;
mod types;

pub use types::{Applied, BlacklistEntry};

use crate::error::StoreError;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shared blacklist store.
#[derive(Debug)]
pub struct BlacklistStore {
    entries: Mutex<BTreeMap<IpAddr, DateTime<Utc>>>,
    path: PathBuf,
}

impl BlacklistStore {
    /// Create an empty store persisting to `path`.
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the store from disk. Returns an empty store if the file is
    /// missing or unreadable; never fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Blacklist file not found, starting empty");
            if let Some(dir) = path.parent()
                && !dir.as_os_str().is_empty()
                && !dir.exists()
            {
                warn!(dir = %dir.display(), "Blacklist directory does not exist, changes stay in memory until it is created");
            }
            return Self::with_path(path);
        }

        match persistence::load(path) {
            Ok(entries) => {
                info!(path = %path.display(), entries = entries.len(), "Blacklist loaded");
                crate::metrics::set_blacklist_size(entries.len());
                Self {
                    entries: Mutex::new(entries),
                    path: path.to_path_buf(),
                }
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load blacklist, starting empty");
                Self::with_path(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full map to disk.
    pub fn save(&self) -> Result<(), StoreError> {
        let entries = self.entries.lock();
        persistence::save(&entries, &self.path)
    }

    /// Blacklist `ip` for `ttl` from now, overwriting any existing expiry.
    pub fn put(&self, ip: IpAddr, ttl: Duration) -> Applied<DateTime<Utc>> {
        self.put_until(ip, expiry_after(Utc::now(), ttl))
    }

    /// Blacklist `ip` until `expires_at`, overwriting any existing expiry.
    pub fn put_until(&self, ip: IpAddr, expires_at: DateTime<Utc>) -> Applied<DateTime<Utc>> {
        let mut entries = self.entries.lock();
        entries.insert(ip, expires_at);
        crate::metrics::set_blacklist_size(entries.len());
        debug!(ip = %ip, expires_at = %expires_at, "Blacklisted IP");

        Applied {
            value: expires_at,
            persisted: persistence::save(&entries, &self.path),
        }
    }

    /// Remove and return every entry whose expiry is `<= now`.
    ///
    /// Persists only if something was removed.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> Applied<Vec<BlacklistEntry>> {
        let mut entries = self.entries.lock();

        let expired: Vec<BlacklistEntry> = entries
            .iter()
            .map(|(&ip, &expires_at)| BlacklistEntry { ip, expires_at })
            .filter(|entry| entry.is_expired_at(now))
            .collect();

        if expired.is_empty() {
            return Applied {
                value: expired,
                persisted: Ok(()),
            };
        }

        for entry in &expired {
            entries.remove(&entry.ip);
        }
        crate::metrics::set_blacklist_size(entries.len());
        debug!(count = expired.len(), "Removed expired blacklist entries");

        Applied {
            value: expired,
            persisted: persistence::save(&entries, &self.path),
        }
    }

    /// Remove every entry and return the removed IPs. Always persists.
    pub fn clear_all(&self) -> Applied<Vec<IpAddr>> {
        let mut entries = self.entries.lock();
        let removed: Vec<IpAddr> = std::mem::take(&mut *entries).into_keys().collect();
        crate::metrics::set_blacklist_size(0);
        debug!(count = removed.len(), "Cleared blacklist");

        Applied {
            value: removed,
            persisted: persistence::save(&entries, &self.path),
        }
    }

    /// Read-only copy of the current map.
    pub fn snapshot(&self) -> BTreeMap<IpAddr, DateTime<Utc>> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[cfg(test)]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.entries.lock().contains_key(ip)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// `now + ttl`, saturating at the largest representable time.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
