//! Environment variable overrides.
//!
//! Applied after the TOML file so container deployments can configure the
//! service without shipping a file.

use super::types::{Config, ConfigError};

pub const ENV_API_KEY: &str = "ROTATOR_API_KEY";
pub const ENV_API_KEY_HEADER: &str = "ROTATOR_API_KEY_HEADER";
pub const ENV_PREFER_IPV4: &str = "ROTATOR_PREFER_IPV4";
pub const ENV_LISTEN: &str = "ROTATOR_LISTEN";
pub const ENV_BLACKLIST_FILE: &str = "ROTATOR_BLACKLIST_FILE";
pub const ENV_TRACE_URL: &str = "ROTATOR_TRACE_URL";
pub const ENV_METRICS_PORT: &str = "ROTATOR_METRICS_PORT";

impl Config {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY) {
            // An explicitly empty key turns auth off even if the file sets one.
            self.server.api_key = (!key.is_empty()).then_some(key);
        }
        if let Some(header) = lookup(ENV_API_KEY_HEADER) {
            self.server.api_key_header = header;
        }
        if let Some(value) = lookup(ENV_PREFER_IPV4) {
            self.resolver.prefer_ipv4 = parse_bool(&value).ok_or(ConfigError::InvalidEnv {
                var: ENV_PREFER_IPV4,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_LISTEN) {
            self.server.listen = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_LISTEN,
                value,
            })?;
        }
        if let Some(path) = lookup(ENV_BLACKLIST_FILE) {
            self.blacklist.path = path.into();
        }
        if let Some(url) = lookup(ENV_TRACE_URL) {
            self.resolver.trace_url = url;
        }
        if let Some(value) = lookup(ENV_METRICS_PORT) {
            let port = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_METRICS_PORT,
                value,
            })?;
            self.server.metrics_port = Some(port);
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
