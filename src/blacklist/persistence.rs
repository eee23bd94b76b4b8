//! Persistence functions for the blacklist.
//!
//! On disk the blacklist is a single JSON object mapping IP strings to
//! ISO-8601 expiry timestamps.

use crate::error::StoreError;
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Timestamp layout without an offset, as written by earlier deployments.
const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Save the blacklist to disk.
///
/// Uses atomic write (temp file + rename) to prevent corruption.
pub(super) fn save(entries: &BTreeMap<IpAddr, DateTime<Utc>>, path: &Path) -> Result<(), StoreError> {
    let state: BTreeMap<String, String> = entries
        .iter()
        .map(|(ip, expires_at)| {
            (
                ip.to_string(),
                expires_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            )
        })
        .collect();

    // Write to temp file first
    let temp_path = temp_path(path);
    let file = File::create(&temp_path)?;
    if let Err(e) = write_and_rename(file, &state, &temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    debug!(path = %path.display(), entries = state.len(), "Blacklist saved");
    Ok(())
}

fn write_and_rename(
    file: File,
    state: &BTreeMap<String, String>,
    temp_path: &Path,
    path: &Path,
) -> Result<(), StoreError> {
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, state)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    // Atomic rename
    fs::rename(temp_path, path)?;
    Ok(())
}

/// Load the blacklist from a JSON file.
///
/// Entries with an unparsable IP or timestamp are skipped with a warning.
pub(super) fn load(path: &Path) -> Result<BTreeMap<IpAddr, DateTime<Utc>>, StoreError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let state: HashMap<String, String> = serde_json::from_reader(reader)?;

    let mut entries = BTreeMap::new();
    for (ip_str, timestamp) in state {
        let Ok(ip) = ip_str.trim().parse::<IpAddr>() else {
            warn!(ip = %ip_str, "Skipping blacklist entry with invalid IP");
            continue;
        };
        let Some(expires_at) = parse_timestamp(&timestamp) else {
            warn!(ip = %ip, timestamp = %timestamp, "Skipping blacklist entry with invalid timestamp");
            continue;
        };
        entries.insert(ip, expires_at);
    }

    Ok(entries)
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, and naive timestamps which are taken to be
/// in the host's local time zone.
pub(super) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, NAIVE_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
